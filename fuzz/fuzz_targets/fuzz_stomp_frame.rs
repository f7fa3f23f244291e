#![no_main]

use libfuzzer_sys::fuzz_target;
use lifegame_client::stomp::Frame;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Parsing arbitrary input and re-parsing our own encoding must not panic.
    if let Ok(Some(frame)) = Frame::parse(text) {
        let _ = Frame::parse(&frame.encode());
    }
});
