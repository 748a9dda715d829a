use std::thread::sleep;
use std::time::Duration;

fn main() {
    otrace::set_process_name("ex-counters");
    otrace::set_output_path("counters.json");

    let mut queued = 0.0;
    for frame in 0..30 {
        otrace::mark_frame(frame);

        queued = (queued + 3.0) * 0.8;
        otrace::counter("queue_len", None, &[("queue_len", queued)]);
        otrace::counter(
            "io_bytes",
            Some("io"),
            &[("read", (frame * 512) as f64), ("written", (frame * 128) as f64)],
        );

        if frame % 10 == 0 {
            let id = 1000 + frame;
            otrace::flow_begin(id);
            otrace::flow_step(id);
            otrace::flow_end(id);
        }

        sleep(Duration::from_millis(16));
    }

    otrace::flush(None);
}
