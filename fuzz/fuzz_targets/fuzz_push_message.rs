#![no_main]

use libfuzzer_sys::fuzz_target;
use word_duel_sync::protocol::{GameView, PushMessage};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Envelope parsing must reject garbage without panicking.
    if let Ok(PushMessage::GameState { view, timestamp }) = PushMessage::parse(text) {
        // Ordering metadata is derived from whatever the backend sent.
        let _ = view.stamp(timestamp);
    }

    // Views also arrive bare from the request/response API.
    let _ = serde_json::from_slice::<GameView>(data);
});
