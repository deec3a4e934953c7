#![no_main]

use libfuzzer_sys::fuzz_target;
use ripple_ws::codec::FrameDecoder;
use ripple_ws::config::WebSocketConfig;
use ripple_ws::Role;

/// Feeds arbitrary bytes into the incremental frame decoder in small,
/// unevenly-sized chunks (mimicking fragmented socket reads) and drains
/// whatever frames it claims are complete. The decoder must never panic,
/// regardless of how malformed or truncated the input is — a protocol
/// violation should surface as `Err`, not a crash.
fuzz_target!(|data: &[u8]| {
    let config = WebSocketConfig::default();

    for role in [Role::Client, Role::Server] {
        let mut decoder = FrameDecoder::new(&config, role);
        for chunk in data.chunks(7) {
            decoder.feed(chunk);
            loop {
                match decoder.next_frame() {
                    Ok(Some(_frame)) => continue,
                    Ok(None) => break,
                    Err(_protocol_error) => break,
                }
            }
        }
    }
});
