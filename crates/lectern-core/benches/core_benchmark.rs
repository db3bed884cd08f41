//! Benchmark tests for lectern-core operations
//!
//! Run with: cargo bench -p lectern-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use url::Url;

use lectern_core::{
    classify, status, BroadcastKey, BufferThresholds, ControllerConfig, ControllerId, EngineError,
    EngineEvent, ErrorCategory, ErrorDetail, MediaElement, PlaybackController, SegmentEngine,
    SegmentProfile, StreamEndpoints, StreamTarget, ThroughputEstimator,
};

// ============================================================================
// Helpers
// ============================================================================

struct BenchMedia {
    ahead: f64,
    paused: bool,
}

impl MediaElement for BenchMedia {
    fn buffered_ranges(&self) -> Vec<(f64, f64)> {
        vec![(0.0, self.ahead)]
    }

    fn current_time(&self) -> f64 {
        0.0
    }

    fn paused(&self) -> bool {
        self.paused
    }

    fn play(&mut self) {}

    fn pause(&mut self) {}
}

struct BenchEngine;

impl SegmentEngine for BenchEngine {
    type Media = BenchMedia;

    fn load_source(&mut self, _url: &Url) -> lectern_core::Result<()> {
        Ok(())
    }

    fn attach_media(&mut self, _media: &BenchMedia) -> lectern_core::Result<()> {
        Ok(())
    }

    fn start_load(&mut self) {}

    fn recover_media_error(&mut self) -> lectern_core::Result<()> {
        Ok(())
    }

    fn destroy(&mut self) {}
}

fn create_controller(ahead: f64) -> PlaybackController<BenchEngine> {
    let target = StreamTarget::derive(
        &StreamEndpoints::default(),
        BroadcastKey::new("bench").unwrap(),
    )
    .unwrap();
    PlaybackController::attach(
        ControllerId::new(),
        target,
        BenchEngine,
        BenchMedia { ahead, paused: true },
        ControllerConfig::default(),
    )
    .unwrap()
}

fn create_stat_xml(streams: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<rtmp><server><application><name>live</name><live>");
    for i in 0..streams {
        xml.push_str(&format!("<stream><name>key-{i}</name><bw_in>1000</bw_in>"));
        if i % 3 == 0 {
            xml.push_str("<publishing/><active/>");
        }
        xml.push_str("</stream>");
    }
    xml.push_str("</live></application></server></rtmp>");
    xml
}

// ============================================================================
// Threshold Benchmarks
// ============================================================================

fn bench_thresholds(c: &mut Criterion) {
    let mut group = c.benchmark_group("Buffer Thresholds");

    for &target in &[1.0, 2.0, 4.0, 6.0] {
        let profile = SegmentProfile::new(target, target * 4.0);
        group.bench_with_input(BenchmarkId::new("from_profile", target), &profile, |b, profile| {
            b.iter(|| black_box(BufferThresholds::from_profile(black_box(profile))));
        });
    }

    group.finish();
}

fn bench_throughput(c: &mut Criterion) {
    c.bench_function("throughput_record_100", |b| {
        b.iter(|| {
            let mut estimator = ThroughputEstimator::new(0.9);
            for i in 0..100 {
                estimator.record(2000.0, 400.0 + i as f64 * 20.0);
            }
            black_box(estimator.is_healthy())
        });
    });
}

// ============================================================================
// Recovery Benchmarks
// ============================================================================

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("Error Classification");

    let errors = [
        ("non_fatal", EngineError::new(false, ErrorCategory::Network, ErrorDetail::FragmentLoadTimeout)),
        (
            "not_ready",
            EngineError::new(true, ErrorCategory::Network, ErrorDetail::ManifestLoadError).with_status(404),
        ),
        ("media", EngineError::new(true, ErrorCategory::Media, ErrorDetail::BufferAppend)),
    ];

    for (name, error) in &errors {
        group.bench_function(*name, |b| {
            b.iter(|| black_box(classify(black_box(error))));
        });
    }

    group.finish();
}

// ============================================================================
// Status Benchmarks
// ============================================================================

fn bench_status_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Stat Parsing");

    for &streams in &[1, 10, 100] {
        let xml = create_stat_xml(streams);
        group.bench_with_input(BenchmarkId::new("active_keys", streams), &xml, |b, xml| {
            b.iter(|| black_box(status::active_keys(black_box(xml), "live").unwrap()));
        });
    }

    group.finish();
}

// ============================================================================
// Controller Benchmarks
// ============================================================================

fn bench_controller(c: &mut Criterion) {
    let mut group = c.benchmark_group("Controller");

    group.bench_function("tick_buffering", |b| {
        let mut controller = create_controller(3.0);
        b.iter(|| black_box(controller.tick()));
    });

    group.bench_function("profile_update", |b| {
        let mut controller = create_controller(3.0);
        b.iter(|| {
            black_box(controller.handle_engine_event(EngineEvent::SegmentProfileUpdated {
                target_duration: 2.0,
                playlist_duration: 8.0,
            }))
        });
    });

    group.finish();
}

criterion_group!(threshold_benches, bench_thresholds, bench_throughput);

criterion_group!(recovery_benches, bench_classify);

criterion_group!(status_benches, bench_status_parsing);

criterion_group!(controller_benches, bench_controller);

criterion_main!(
    threshold_benches,
    recovery_benches,
    status_benches,
    controller_benches,
);
