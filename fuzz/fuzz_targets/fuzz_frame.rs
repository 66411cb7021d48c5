#![no_main]

use libfuzzer_sys::fuzz_target;
use rtl433_net::core::frame::Frame;
use rtl433_net::protocol::message::Message;

fuzz_target!(|data: &[u8]| {
    // Frame parsing and payload decoding must reject garbage without panicking
    if let Ok(frame) = Frame::from_bytes(data) {
        let _ = Message::from_frame(&frame);
    }
});
