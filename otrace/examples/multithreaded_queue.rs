use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn main() {
    otrace::set_process_name("ex-queue");
    otrace::set_output_path("queue.json");
    otrace::set_thread_name("producer");
    otrace::set_thread_sort_index(0);

    let (tx, rx) = mpsc::channel::<u64>();

    let consumer = thread::spawn(move || {
        otrace::set_thread_name("consumer");
        otrace::set_thread_sort_index(1);
        while let Ok(job) = rx.recv() {
            otrace::flow_end(job);
            let _work = otrace::scope_with("consume", Some("queue"), "job", job as f64);
            thread::sleep(Duration::from_micros(500));
        }
    });

    for job in 0..40 {
        let _produce = otrace::scope("produce", Some("queue"));
        otrace::flow_begin(job);
        tx.send(job).unwrap();
        otrace::counter("queue_depth", Some("queue"), &[("queue_depth", (40 - job) as f64)]);
        thread::sleep(Duration::from_micros(200));
    }
    drop(tx);

    consumer.join().unwrap();
    otrace::flush(None);
}
