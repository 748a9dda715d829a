use std::thread::sleep;
use std::time::Duration;

fn main() {
    otrace::set_process_name("ex-rotation");

    // Rotating plain JSON files: ~1 MB advisory, 4 files.
    otrace::set_output_pattern("traces_json/run-%03u.json", 1, 4);
    for i in 0..600 {
        otrace::instant_kvs("emit", Some("io"), &[("i", (i as i64).into())]);
        if i % 50 == 0 {
            sleep(Duration::from_millis(2));
        }
    }
    otrace::flush(None);

    // Rotating gzip (with the `gzip` feature; plain .json otherwise).
    otrace::set_output_pattern("traces_gz/run-%03u.json.gz", 1, 3);
    for i in 0..600 {
        otrace::instant_kvs("emit_gz", Some("io"), &[("i", (i as i64).into())]);
        if i % 50 == 0 {
            sleep(Duration::from_millis(2));
        }
    }
    otrace::flush(None);

    // Back to single-file mode.
    otrace::set_output_path("rotation_tail.json");
    otrace::set_output_pattern("", 0, 0);
    otrace::instant("done", None);
    otrace::flush(None);
}
