use std::time::{Duration, Instant};

pub fn format_hms(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub fn print_hms(start: &Instant) {
    println!("Elapsed time: {}", format_hms(start.elapsed()));
}
