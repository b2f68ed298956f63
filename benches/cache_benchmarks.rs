use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use feed_preview::{quality_score, CacheConfig, MetadataExtractor, PreviewCache, PreviewRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use url::Url;

const MOCK_URLS: &[&str] = &[
    "https://example1.com/page1",
    "https://github.com/rust-lang/rust",
    "https://docs.aws.amazon.com/lambda/latest/dg/welcome.html",
    "https://stackoverflow.com/questions/1",
    "https://example5.com/page5",
];

const ARTICLE: &str = r#"<html><head>
<title>Fallback</title>
<meta property="og:title" content="Benchmark Article">
<meta property="og:description" content="A page with a full set of Open Graph tags for parsing.">
<meta property="og:image" content="/cover.png">
<meta property="og:site_name" content="Bench">
<link rel="icon" href="/favicon.ico">
</head><body><p>body</p></body></html>"#;

fn create_mock_preview(url: &str) -> PreviewRecord {
    let mut record = PreviewRecord::new(url);
    record.title = Some(format!("Title for {url}"));
    record.description = Some(format!("Description for {url}"));
    record.image_url = Some("https://example.com/image.jpg".to_string());
    record.favicon = Some("https://example.com/favicon.ico".to_string());
    record.site_name = Some("Example Site".to_string());
    record.quality_score = quality_score(&record);
    record
}

fn bench_cache_scenarios(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("cache_performance");
    group
        .sample_size(100)
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));

    let prefill_sizes = [100, 1000];

    for &prefill in &prefill_sizes {
        let cache = PreviewCache::in_memory(CacheConfig::default().with_max_entries(None));
        rt.block_on(async {
            for i in 0..prefill {
                let url = format!("https://filler{i}.example.com/");
                cache.put(&url, &create_mock_preview(&url), None).await.unwrap();
            }
            for url in MOCK_URLS {
                cache.put(url, &create_mock_preview(url), None).await.unwrap();
            }
        });

        group.bench_with_input(BenchmarkId::new("cache_hit", prefill), &cache, |b, cache| {
            b.to_async(&rt)
                .iter(|| async { black_box(cache.get(MOCK_URLS[0]).await.unwrap()) });
        });

        group.bench_with_input(BenchmarkId::new("cache_write", prefill), &cache, |b, cache| {
            let counter = AtomicUsize::new(0);
            b.to_async(&rt).iter(|| async {
                let current = counter.fetch_add(1, Ordering::SeqCst);
                let url = format!("https://dynamic{current}.example.com");
                black_box(cache.put(&url, &create_mock_preview(&url), None).await.unwrap())
            });
        });

        group.bench_with_input(
            BenchmarkId::new("concurrent_cache_access", prefill),
            &cache,
            |b, cache| {
                let cache = Arc::new(cache.clone());
                b.to_async(&rt).iter(|| async {
                    let handles: Vec<_> = MOCK_URLS
                        .iter()
                        .map(|&url| {
                            let cache = Arc::clone(&cache);
                            tokio::spawn(async move { cache.get(url).await.ok().flatten() })
                        })
                        .collect();

                    for handle in handles {
                        black_box(handle.await.unwrap());
                    }
                });
            },
        );

        group.bench_with_input(BenchmarkId::new("get_bulk", prefill), &cache, |b, cache| {
            let urls: Vec<String> = MOCK_URLS.iter().map(|u| u.to_string()).collect();
            b.to_async(&rt)
                .iter(|| async { black_box(cache.get_bulk(&urls).await) });
        });
    }

    group.finish();
}

fn bench_pure_functions(c: &mut Criterion) {
    let mut group = c.benchmark_group("pure_functions");

    let cache = PreviewCache::in_memory(CacheConfig::default());
    group.bench_function("determine_ttl", |b| {
        b.iter(|| {
            for url in MOCK_URLS {
                black_box(cache.determine_ttl(url, None));
            }
        });
    });

    let record = create_mock_preview(MOCK_URLS[0]);
    group.bench_function("quality_score", |b| {
        b.iter(|| black_box(quality_score(&record)));
    });

    let extractor = MetadataExtractor::default();
    let page_url = Url::parse("https://example.com/article").unwrap();
    group.bench_function("extract_from_html", |b| {
        b.iter(|| {
            black_box(extractor.extract_from_html(ARTICLE, page_url.as_str(), &page_url))
        });
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(15));
    targets = bench_cache_scenarios, bench_pure_functions
}
criterion_main!(benches);
