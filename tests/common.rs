use std::sync::Once;

use rust_minipromise::Runtime;

static INIT: Once = Once::new();

/// Sets up the tracing subscriber for tests, ensuring it's only initialized once.
pub fn setup_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt::init();
    });
}

/// A small runtime with tracing enabled.
#[allow(dead_code)]
pub fn runtime() -> Runtime {
    setup_tracing();
    Runtime::builder()
        .name("test")
        .background_threads(2)
        .build()
        .unwrap()
}
