fn main() {
    otrace::set_process_name("ex-filters");
    otrace::set_output_path("filters.json");

    // Allow only important + frame categories; deny debug.
    otrace::enable_categories("important,frame");
    otrace::disable_categories("debug");
    otrace::instant("will-keep", Some("important"));
    otrace::instant("will-drop", Some("debug"));

    // Predicate filter: keep events whose name contains "snap".
    otrace::set_filter(|name: &str, _cat: &str| name.contains("snap"));
    otrace::instant("snapshot", Some("important"));
    otrace::instant("heartbeat", Some("important"));
    otrace::clear_filter();

    // Probabilistic keep gate for volume control.
    otrace::set_sampling(0.3);
    for _ in 0..50 {
        otrace::instant("sampled", Some("frame"));
    }
    otrace::set_sampling(1.0);

    // Reset gates for the rest of the program.
    otrace::enable_categories("");
    otrace::disable_categories("");

    otrace::flush(None);
}
