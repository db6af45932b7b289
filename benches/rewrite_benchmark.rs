use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use url_cleaner::{
    FetchOutcome, FetchedImage, ImageFetch, MessageRewriter, MessageSegment, RewriterConfig,
    TempArtifacts, UrlScanner,
};

const MIXED_TEXT: &str = "看这个 https://x.test/a.png 很可爱，\
    另外参考 https://x.test/doc.pdf。还有（https://x.test/b.jpg）和 \
    http://y.test/page?id=42&lang=zh 以及一段没有链接的普通文字。";

struct InstantFetcher;

#[async_trait]
impl ImageFetch for InstantFetcher {
    async fn fetch(&self, _url: &str, _config: &RewriterConfig) -> FetchOutcome {
        FetchOutcome::Success(FetchedImage {
            path: PathBuf::from("temp_images/bench.png"),
            size: 1,
        })
    }
}

fn bench_scan(c: &mut Criterion) {
    let scanner = UrlScanner::new();
    let long_text = MIXED_TEXT.repeat(50);

    let mut group = c.benchmark_group("scan");
    group.bench_function("mixed_text", |b| {
        b.iter(|| black_box(scanner.scan(black_box(MIXED_TEXT))))
    });
    group.bench_function("long_text", |b| {
        b.iter(|| black_box(scanner.scan(black_box(&long_text))))
    });
    group.finish();
}

fn bench_rewrite(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let rewriter = MessageRewriter::new(Arc::new(InstantFetcher), TempArtifacts::new("temp_images"));
    // keep scheduled cleanups from piling up in the runtime
    let config = RewriterConfig::default().with_cleanup_delay_seconds(0);

    let mut group = c.benchmark_group("rewrite");
    group
        .sample_size(50)
        .measurement_time(Duration::from_secs(5));

    group.bench_function("no_urls", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                rewriter
                    .rewrite(vec![MessageSegment::text("没有任何链接的一段回复文字")], &config)
                    .await,
            )
        });
    });

    group.bench_function("mixed_urls", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                rewriter
                    .rewrite(vec![MessageSegment::text(MIXED_TEXT)], &config)
                    .await,
            )
        });
    });

    group.finish();
}

criterion_group!(benches, bench_scan, bench_rewrite);
criterion_main!(benches);
