#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use rtl433_net::core::codec::FrameCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Feed the stream decoder arbitrary bytes, as a hostile peer would
    let mut codec = FrameCodec::new(64 * 1024);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
    let _ = codec.decode_eof(&mut buf);
});
