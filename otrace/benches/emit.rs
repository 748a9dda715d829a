use divan::Bencher;
use tempfile::TempDir;

fn main() {
    divan::main();
}

fn setup_output() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    otrace::set_output_path(temp_dir.path().join("bench.json"));
    otrace::enable();
    otrace::set_sampling(1.0);
    temp_dir
}

#[divan::bench]
fn bench_instant(bencher: Bencher) {
    let _dir = setup_output();
    bencher.bench_local(|| {
        otrace::instant("bench_instant", Some("bench"));
    });
}

#[divan::bench]
fn bench_instant_with_args(bencher: Bencher) {
    let _dir = setup_output();
    bencher.bench_local(|| {
        otrace::instant_kvs(
            "bench_instant_kv",
            Some("bench"),
            &[("request_id", 123.into()), ("stage", "parse".into())],
        );
    });
}

#[divan::bench]
fn bench_scope(bencher: Bencher) {
    let _dir = setup_output();
    bencher.bench_local(|| {
        let _s = otrace::scope("bench_scope", Some("bench"));
    });
}

#[divan::bench]
fn bench_counter(bencher: Bencher) {
    let _dir = setup_output();
    let mut value = 0.0;
    bencher.bench_local(|| {
        value += 1.0;
        otrace::counter("bench_counter", Some("bench"), &[("bench_counter", value)]);
    });
}

#[divan::bench]
fn bench_disabled_emit(bencher: Bencher) {
    let _dir = setup_output();
    otrace::disable();
    bencher.bench_local(|| {
        otrace::instant("bench_disabled", Some("bench"));
    });
    otrace::enable();
}
