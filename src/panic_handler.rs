use log::error;
use std::io::{self, Write};
use std::panic;

pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // The log file is often the only trace a host keeps.
        error!("Panic: {panic_info}");
        log::logger().flush();
        let _ = io::stderr().flush();

        default_hook(panic_info);

        std::process::exit(1);
    }));
}
