#![no_main]

use libfuzzer_sys::fuzz_target;
use pktgate_engine::parser::{self, Parsed};

fuzz_target!(|data: &[u8]| {
    // 어떤 입력이든 패닉 없이 결과를 내야 함
    let Ok(Parsed::Ipv4(packet)) = parser::parse(data) else {
        return;
    };

    // 페이로드는 항상 프레임 안쪽
    let payload = packet.payload();
    assert!(payload.len() <= data.len());
    assert_eq!(packet.frame_len, data.len());

    if let Some(t) = packet.transport {
        assert!(t.payload_offset <= data.len());
        // IP total length가 패딩을 잘라낼 수 있음
        assert!(payload.len() <= data.len() - t.payload_offset);
        assert!(packet.flow_key().is_some());
    } else {
        assert!(packet.flow_key().is_none());
    }
});
