#[global_allocator]
static ALLOC: otrace::TracingAllocator = otrace::TracingAllocator::system();

fn main() {
    otrace::set_process_name("ex-heap");
    otrace::set_output_path("heap_demo.json");
    otrace::instant("program_start", None);

    otrace::heap_set_sampling(1.0); // guarantee attribution in this window
    otrace::heap_enable(true);

    let mut hold: Vec<Vec<u8>> = Vec::new();
    for _ in 0..120 {
        hold.push(vec![0u8; 1 << 14]); // retained
    }
    std::mem::forget(vec![1u8; 1024]); // intentional leaks
    std::mem::forget(vec![2u8; 2048]);

    otrace::heap_set_sampling(0.0); // keep heap enabled; quiet hooks during report
    otrace::heap_report();
    otrace::instant("report_done", None);

    otrace::flush(None);
    otrace::heap_enable(false);
    drop(hold);
}
