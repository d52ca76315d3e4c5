//! Subscriber installation and crate-scoped filtering.

use std::io::Write;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

/// Writer that appends into a shared buffer, so the test can read back
/// what the subscriber emitted.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("buffer lock")).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = SharedBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// One test fn: a process holds a single global subscriber, so install,
// filtering, and the already-installed error are checked in sequence.
#[test]
fn writer_subscriber_emits_json_and_scopes_to_the_crate() {
    let buffer = SharedBuffer::default();
    wabridge::logging::init_with_writer(buffer.clone()).expect("first install succeeds");

    // Crate-targeted events pass the default filter; foreign targets do not.
    tracing::info!(target: "wabridge::evolution", instance_id = "vet-01", "status poll ok");
    tracing::info!(target: "some_host::router", "unrelated host chatter");

    let output = buffer.contents();
    assert!(output.contains("status poll ok"));
    assert!(output.contains("\"instance_id\":\"vet-01\""));
    assert!(output.contains("wabridge::evolution"));
    // Only meaningful when the filter is the crate-scoped default.
    if std::env::var_os("RUST_LOG").is_none() {
        assert!(!output.contains("unrelated host chatter"));
    }

    // A second global install is refused rather than silently replacing.
    assert!(wabridge::logging::init_console().is_err());
}
