use std::thread::sleep;
use std::time::Duration;

fn main() {
    otrace::set_process_name("ex-basics");
    otrace::set_output_path("basics.json");

    {
        let _load = otrace::scope("load", Some("startup"));
        sleep(Duration::from_millis(2));
        otrace::instant("config_loaded", Some("startup"));
    }

    otrace::begin("upload", Some("io"));
    sleep(Duration::from_millis(1));
    otrace::end("upload", Some("io"));

    for tile in 0..8 {
        let _s = otrace::scope_with("tile", Some("render"), "index", tile as f64);
        sleep(Duration::from_micros(300));
    }

    otrace::flush(None);
}
