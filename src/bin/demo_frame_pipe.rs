// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   demo_frame_pipe produce <width> <height> <fps>
//   demo_frame_pipe consume <channel_id> <poll_ms>
//   demo_frame_pipe clear <channel_id>
//
// The producer runs a test-pattern stream, publishes it over shared memory
// and prints the channel id. The consumer attaches to that id and prints
// each frame it receives. `clear` removes resources left by a producer that
// was killed. Set RUST_LOG=framepipe=debug for protocol tracing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use framepipe::{
    ChannelConfig, ChannelSlotRegistry, EventKind, SharedChannel, Shutdown, Stream, StreamConfig,
    TestPattern,
};

fn do_produce(width: u32, height: u32, fps: u32, quit: Arc<AtomicBool>) -> framepipe::Result<()> {
    let config = ChannelConfig::default();
    let registry = ChannelSlotRegistry::from_config(&config);
    let stream = Stream::new("test-pattern");
    let events = stream.listen_events();

    let id = stream.enable_remote_stream(&registry, &config)?;
    println!("produce: channel id {id}");
    println!("produce: run `demo_frame_pipe consume {id} 10` in another terminal");

    stream.start(TestPattern::new(width, height, fps), StreamConfig::default())?;
    while !quit.load(Ordering::Acquire) {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(ev) => {
                println!("produce: event {} at {}", ev.kind.name(), ev.timestamp_us);
                match ev.kind {
                    EventKind::FatalError | EventKind::StartFailed => break,
                    EventKind::RemoteStreamFailed(reason) => {
                        eprintln!("produce: remote stream failed: {reason}");
                        break;
                    }
                    _ => {}
                }
            }
            Err(_) => continue,
        }
    }
    stream.stop(Shutdown::Join);
    while let Ok(ev) = events.try_recv() {
        println!("produce: event {}", ev.kind.name());
    }
    Ok(())
}

fn do_consume(id: &str, poll_ms: u64, quit: Arc<AtomicBool>) -> framepipe::Result<()> {
    let config = ChannelConfig::default();
    let mut channel = loop {
        match SharedChannel::open_consumer(id, &config) {
            Ok(ch) => break ch,
            Err(e) if e.is_not_ready() => {
                if quit.load(Ordering::Acquire) {
                    return Ok(());
                }
                println!("consume: waiting for producer on {id}...");
                thread::sleep(Duration::from_millis(500));
            }
            Err(e) => return Err(e),
        }
    };

    let mut idle = 0usize;
    while !quit.load(Ordering::Acquire) {
        match channel.read()? {
            Some(frames) => {
                let p = &frames.planes()[0];
                println!(
                    "consume: frame {} planes {} bytes {} ({}x{})",
                    frames.frame_number(),
                    frames.plane_count(),
                    frames.payload_len(),
                    p.width(),
                    p.height()
                );
                idle = 0;
            }
            None => {
                idle += 1;
                if idle % 100 == 0 {
                    println!("consume: no frame for {} polls", idle);
                }
                thread::sleep(Duration::from_millis(poll_ms));
            }
        }
    }
    channel.close();
    Ok(())
}

fn usage() -> ! {
    eprintln!("usage: demo_frame_pipe produce <width> <height> <fps>");
    eprintln!("       demo_frame_pipe consume <channel_id> <poll_ms>");
    eprintln!("       demo_frame_pipe clear <channel_id>");
    std::process::exit(1);
}

fn parse<T: std::str::FromStr>(arg: Option<&String>, what: &str) -> T {
    match arg.map(|s| s.parse::<T>()) {
        Some(Ok(v)) => v,
        _ => {
            eprintln!("invalid or missing {what}");
            usage();
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        usage();
    }

    let quit = Arc::new(AtomicBool::new(false));
    {
        let q = Arc::clone(&quit);
        ctrlc_or_sigterm(move || q.store(true, Ordering::Release));
    }

    let result = match args[1].as_str() {
        "produce" => {
            let width = parse(args.get(2), "width");
            let height = parse(args.get(3), "height");
            let fps = parse(args.get(4), "fps");
            do_produce(width, height, fps, quit)
        }
        "consume" => {
            let poll_ms = parse(args.get(3), "poll_ms");
            do_consume(&args[2], poll_ms, quit)
        }
        "clear" => {
            SharedChannel::clear_storage(&args[2]);
            println!("cleared {}", args[2]);
            Ok(())
        }
        other => {
            eprintln!("unknown mode: {other}");
            usage();
        }
    };
    if let Err(e) = result {
        eprintln!("demo_frame_pipe: {e}");
        std::process::exit(2);
    }
}

// Minimal signal hook: sets the flag on SIGINT / SIGTERM / SIGHUP.
fn ctrlc_or_sigterm(f: impl Fn() + Send + 'static) {
    #[cfg(unix)]
    {
        use std::sync::Mutex;
        static CB: std::sync::OnceLock<Mutex<Box<dyn Fn() + Send>>> = std::sync::OnceLock::new();
        CB.get_or_init(|| Mutex::new(Box::new(f)));
        extern "C" fn handler(_: libc::c_int) {
            if let Some(cb) = CB.get() {
                if let Ok(g) = cb.lock() {
                    g();
                }
            }
        }
        unsafe {
            libc::signal(libc::SIGINT, handler as *const () as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handler as *const () as libc::sighandler_t);
            libc::signal(libc::SIGHUP, handler as *const () as libc::sighandler_t);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = f;
    }
}
