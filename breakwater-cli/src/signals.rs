use std::sync::OnceLock;

use breakwater_server::ShutdownFlag;

static SHUTDOWN: OnceLock<ShutdownFlag> = OnceLock::new();

extern "C" fn on_signal(_signum: libc::c_int) {
    // Only an atomic store happens here; anything more is not
    // async-signal-safe.
    if let Some(flag) = SHUTDOWN.get() {
        flag.request();
    }
}

/// Route SIGINT and SIGTERM into the shutdown flag the event loop polls,
/// and ignore SIGPIPE so writes to closed peers surface as errors instead
/// of killing the process.
pub fn install(shutdown: &ShutdownFlag) {
    let _ = SHUTDOWN.set(shutdown.clone());
    unsafe {
        libc::signal(
            libc::SIGINT,
            on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGTERM,
            on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t,
        );
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}
