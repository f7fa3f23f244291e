#![no_main]

use libfuzzer_sys::fuzz_target;
use lifegame_client::codec;

fuzz_target!(|data: &[u8]| {
    let Ok(payload) = std::str::from_utf8(data) else {
        return;
    };

    // Every topic decoder must reject garbage with an error, never a panic.
    let _ = codec::decode(payload);
    let _ = codec::decode_game_topic(payload);
    let _ = codec::decode_status(payload);
    let _ = codec::decode_jobs(payload);
    let _ = codec::decode_houses(payload);
});
