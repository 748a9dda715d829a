use std::thread::sleep;
use std::time::Duration;

fn main() {
    otrace::set_process_name("ex-synth");
    otrace::set_output_path("synth.json");
    otrace::enable_synthetic_tracks(true);

    // FPS from frames.
    for frame in 0..60 {
        otrace::mark_frame(frame);
        sleep(Duration::from_millis(16));
    }

    // Derivative of a counter.
    let mut acc = 0.0;
    for _ in 0..40 {
        acc += 1024.0;
        otrace::counter("bytes_uploaded", None, &[("bytes_uploaded", acc)]);
        sleep(Duration::from_millis(10));
    }

    // Latency percentiles for a scope.
    for i in 0..30 {
        let _tile = otrace::scope("tile", None);
        sleep(Duration::from_micros(300 + i * 50));
    }

    otrace::flush(None);
}
