//! Display-oriented clean-up and scoring of preview records.

use std::collections::BTreeMap;

use url::Url;

use crate::utils::{collapse_whitespace, truncate_chars};
use crate::PreviewRecord;

/// Category and icon attached to a first-party service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceProfile {
    pub category: &'static str,
    pub icon: &'static str,
}

const DEFAULT_PROFILE: ServiceProfile = ServiceProfile {
    category: "General",
    icon: "aws-general",
};

// Keyed by the uppercased first path segment of a first-party URL
const SERVICE_CATALOG: &[(&str, ServiceProfile)] = &[
    ("LAMBDA", ServiceProfile { category: "Compute", icon: "aws-lambda" }),
    ("EC2", ServiceProfile { category: "Compute", icon: "aws-ec2" }),
    ("ECS", ServiceProfile { category: "Containers", icon: "aws-ecs" }),
    ("EKS", ServiceProfile { category: "Containers", icon: "aws-eks" }),
    ("S3", ServiceProfile { category: "Storage", icon: "aws-s3" }),
    ("EFS", ServiceProfile { category: "Storage", icon: "aws-efs" }),
    ("DYNAMODB", ServiceProfile { category: "Database", icon: "aws-dynamodb" }),
    ("RDS", ServiceProfile { category: "Database", icon: "aws-rds" }),
    ("AURORA", ServiceProfile { category: "Database", icon: "aws-aurora" }),
    ("SQS", ServiceProfile { category: "Application Integration", icon: "aws-sqs" }),
    ("SNS", ServiceProfile { category: "Application Integration", icon: "aws-sns" }),
    ("EVENTBRIDGE", ServiceProfile { category: "Application Integration", icon: "aws-eventbridge" }),
    ("API-GATEWAY", ServiceProfile { category: "Networking", icon: "aws-api-gateway" }),
    ("CLOUDFRONT", ServiceProfile { category: "Networking", icon: "aws-cloudfront" }),
    ("VPC", ServiceProfile { category: "Networking", icon: "aws-vpc" }),
    ("IAM", ServiceProfile { category: "Security", icon: "aws-iam" }),
    ("CLOUDFORMATION", ServiceProfile { category: "Management", icon: "aws-cloudformation" }),
    ("CLOUDWATCH", ServiceProfile { category: "Management", icon: "aws-cloudwatch" }),
    ("BEDROCK", ServiceProfile { category: "Machine Learning", icon: "aws-bedrock" }),
    ("SAGEMAKER", ServiceProfile { category: "Machine Learning", icon: "aws-sagemaker" }),
];

// Checked in order against the lowercased path; first match wins
const DOC_TYPE_PATTERNS: &[(&str, &str)] = &[
    ("/apireference/", "API Reference"),
    ("api-reference", "API Reference"),
    ("/api/", "API Reference"),
    ("getting-started", "Getting Started"),
    ("gettingstarted", "Getting Started"),
    ("/tutorials/", "Tutorial"),
    ("/blogs/", "Blog"),
];

const DEFAULT_DOC_TYPE: &str = "Documentation";

pub fn service_profile(service_name: &str) -> ServiceProfile {
    let key = service_name.to_ascii_uppercase();
    SERVICE_CATALOG
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, profile)| *profile)
        .unwrap_or(DEFAULT_PROFILE)
}

pub fn classify_doc_type(path: &str) -> &'static str {
    let path = path.to_ascii_lowercase();
    DOC_TYPE_PATTERNS
        .iter()
        .find(|(pattern, _)| path.contains(pattern))
        .map(|(_, doc_type)| *doc_type)
        .unwrap_or(DEFAULT_DOC_TYPE)
}

/// Deterministic 0..=100 completeness score, recomputed from scratch.
///
/// Error records always score 0.
pub fn quality_score(record: &PreviewRecord) -> u8 {
    if record.is_error() {
        return 0;
    }

    let present = |field: &Option<String>| {
        field
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().count())
    };

    let mut score: u32 = 0;
    if let Some(len) = present(&record.title) {
        score += 30;
        if (10..60).contains(&len) {
            score += 10;
        }
    }
    if let Some(len) = present(&record.description) {
        score += 25;
        if (50..200).contains(&len) {
            score += 10;
        }
    }
    if present(&record.image_url).is_some() {
        score += 20;
    }
    if present(&record.site_name).is_some() {
        score += 10;
    }
    if record.is_first_party_official {
        score += 5;
    }

    score.min(100) as u8
}

#[derive(Debug, Clone)]
pub struct Enhancer {
    max_description_length: usize,
}

impl Enhancer {
    pub fn new(max_description_length: usize) -> Self {
        Self {
            max_description_length,
        }
    }

    pub fn normalize_description(&self, description: &str) -> String {
        truncate_chars(
            &collapse_whitespace(description),
            self.max_description_length,
        )
    }

    /// Full enhancement pass. Idempotent: enhancing twice changes nothing further.
    pub fn enhance(&self, mut record: PreviewRecord) -> PreviewRecord {
        record.description = record
            .description
            .as_deref()
            .map(|d| self.normalize_description(d))
            .filter(|d| !d.is_empty());

        record.image_url = record.image_url.map(|image| upgrade_to_https(&image));

        record.service_enhancements = if record.is_first_party_official {
            record
                .official_service_name
                .as_deref()
                .map(|service| first_party_enhancements(service, &record.url))
        } else {
            None
        };

        record.refresh_content_hash();
        record.quality_score = quality_score(&record);
        record
    }
}

fn upgrade_to_https(image_url: &str) -> String {
    match Url::parse(image_url) {
        Ok(mut url) if url.scheme() == "http" => {
            if url.set_scheme("https").is_ok() {
                url.to_string()
            } else {
                image_url.to_string()
            }
        }
        _ => image_url.to_string(),
    }
}

fn first_party_enhancements(service_name: &str, url: &str) -> BTreeMap<String, String> {
    let profile = service_profile(service_name);
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default();

    BTreeMap::from([
        ("category".to_string(), profile.category.to_string()),
        ("icon".to_string(), profile.icon.to_string()),
        ("docType".to_string(), classify_doc_type(&path).to_string()),
    ])
}
