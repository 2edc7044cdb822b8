//! 헤더 파서: Ethernet/IPv4/TCP/UDP/ICMP
//!
//! 원시 프레임 바이트에서 분류에 필요한 필드만 읽습니다. 모든 접근은
//! 슬라이스 길이로 경계 검사를 하며, 버퍼를 넘는 읽기는 즉시
//! [`MalformedPacket`]으로 실패합니다. IPv4가 아닌 트래픽은 에러가 아니라
//! [`Parsed::NonIpv4`]입니다.
//!
//! 순수 함수이며 테이블이나 상태에 접근하지 않습니다.
//!
//! # 레이아웃
//! ```text
//! 0        14             14+ihl*4            payload_offset
//! ├─ eth ──┼─ ipv4 (ihl) ──┼─ tcp (doff) / udp / icmp ─┼─ payload ─▶
//! ```

use std::fmt;
use std::net::Ipv4Addr;

use pktgate_common::{
    ETH_HDR_LEN, ETH_P_IP, FlowKey, ICMP_HDR_LEN, IPV4_MIN_HDR_LEN, IPV4_VERSION, PROTO_ICMP,
    PROTO_TCP, PROTO_UDP, TCP_MIN_HDR_LEN, UDP_HDR_LEN,
};

/// 헤더 계층
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Ethernet,
    Ipv4,
    Tcp,
    Udp,
    Icmp,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ethernet => "ethernet",
            Self::Ipv4 => "ipv4",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
        };
        f.write_str(name)
    }
}

/// 잘리거나 손상된 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MalformedPacket {
    /// 헤더가 버퍼 끝을 넘어감
    #[error("truncated {layer} header: need {need} bytes, have {have}")]
    Truncated {
        layer: Layer,
        need: usize,
        have: usize,
    },

    /// IPv4 EtherType인데 version 필드가 4가 아님
    #[error("unexpected IP version {0}")]
    BadVersion(u8),

    /// ihl < 5
    #[error("invalid IPv4 header length {0} (words)")]
    BadHeaderLength(u8),

    /// doff < 5
    #[error("invalid TCP data offset {0} (words)")]
    BadDataOffset(u8),
}

/// L4 헤더에서 읽은 필드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transport {
    /// 출발지 포트 (ICMP는 0)
    pub src_port: u16,
    /// 목적지 포트 (ICMP는 `type << 8 | code`)
    pub dst_port: u16,
    /// 프레임 시작 기준 페이로드 오프셋
    pub payload_offset: usize,
    /// TCP 플래그 (TCP가 아니면 0)
    pub tcp_flags: u8,
}

/// IPv4 패킷 뷰
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Packet<'a> {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub protocol: u8,
    /// IP 헤더 길이 (바이트)
    pub ip_header_len: usize,
    /// IP 헤더의 total length 필드
    pub total_length: u16,
    /// TCP/UDP/ICMP일 때만 `Some`
    pub transport: Option<Transport>,
    /// 전체 프레임 길이
    pub frame_len: usize,
    payload: &'a [u8],
}

impl<'a> Ipv4Packet<'a> {
    /// L4 헤더 뒤의 페이로드. L4를 해석하지 않은 경우 빈 슬라이스입니다.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// 5-tuple 키. L4를 해석하지 않은 경우 `None`.
    pub fn flow_key(&self) -> Option<FlowKey> {
        self.transport.map(|t| {
            FlowKey::new(
                u32::from(self.src_ip),
                u32::from(self.dst_ip),
                t.src_port,
                t.dst_port,
                self.protocol,
            )
        })
    }
}

/// 파싱 결과
#[derive(Debug, Clone, Copy)]
pub enum Parsed<'a> {
    /// IPv4가 아닌 프레임 (분류하지 않고 통과)
    NonIpv4 { eth_type: u16 },
    /// IPv4 패킷
    Ipv4(Ipv4Packet<'a>),
}

impl Parsed<'_> {
    /// 이더넷 타입
    pub fn eth_type(&self) -> u16 {
        match self {
            Self::NonIpv4 { eth_type } => *eth_type,
            Self::Ipv4(_) => ETH_P_IP,
        }
    }
}

/// 프레임을 파싱합니다.
///
/// 버퍼 길이는 슬라이스 길이입니다.
pub fn parse(frame: &[u8]) -> Result<Parsed<'_>, MalformedPacket> {
    let eth = need(frame, 0, ETH_HDR_LEN, Layer::Ethernet)?;
    let eth_type = be16(eth, 12);
    if eth_type != ETH_P_IP {
        return Ok(Parsed::NonIpv4 { eth_type });
    }

    let ip = need(frame, ETH_HDR_LEN, IPV4_MIN_HDR_LEN, Layer::Ipv4)?;
    let version = ip[0] >> 4;
    if version != IPV4_VERSION {
        return Err(MalformedPacket::BadVersion(version));
    }
    let ihl = ip[0] & 0x0f;
    if usize::from(ihl) * 4 < IPV4_MIN_HDR_LEN {
        return Err(MalformedPacket::BadHeaderLength(ihl));
    }
    let ip_header_len = usize::from(ihl) * 4;
    // 옵션 포함 전체 IP 헤더
    need(frame, ETH_HDR_LEN, ip_header_len, Layer::Ipv4)?;

    let total_length = be16(ip, 2);
    let protocol = ip[9];
    let src_ip = Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]);
    let dst_ip = Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]);

    // 이더넷 패딩을 페이로드에서 제외
    let l4_start = ETH_HDR_LEN + ip_header_len;
    let ip_end = ETH_HDR_LEN + usize::from(total_length);
    let frame_end = if usize::from(total_length) >= ip_header_len && ip_end <= frame.len() {
        ip_end
    } else {
        frame.len()
    };

    let transport = match protocol {
        PROTO_TCP => {
            let tcp = need(frame, l4_start, TCP_MIN_HDR_LEN, Layer::Tcp)?;
            let doff = tcp[12] >> 4;
            if usize::from(doff) * 4 < TCP_MIN_HDR_LEN {
                return Err(MalformedPacket::BadDataOffset(doff));
            }
            let tcp_len = usize::from(doff) * 4;
            need(frame, l4_start, tcp_len, Layer::Tcp)?;
            Some(Transport {
                src_port: be16(tcp, 0),
                dst_port: be16(tcp, 2),
                payload_offset: l4_start + tcp_len,
                tcp_flags: tcp[13],
            })
        }
        PROTO_UDP => {
            let udp = need(frame, l4_start, UDP_HDR_LEN, Layer::Udp)?;
            Some(Transport {
                src_port: be16(udp, 0),
                dst_port: be16(udp, 2),
                payload_offset: l4_start + UDP_HDR_LEN,
                tcp_flags: 0,
            })
        }
        PROTO_ICMP => {
            let icmp = need(frame, l4_start, ICMP_HDR_LEN, Layer::Icmp)?;
            Some(Transport {
                src_port: 0,
                dst_port: u16::from(icmp[0]) << 8 | u16::from(icmp[1]),
                payload_offset: l4_start + ICMP_HDR_LEN,
                tcp_flags: 0,
            })
        }
        _ => None,
    };

    let payload = match transport {
        Some(t) if t.payload_offset <= frame_end => &frame[t.payload_offset..frame_end],
        _ => &[],
    };

    Ok(Parsed::Ipv4(Ipv4Packet {
        src_ip,
        dst_ip,
        protocol,
        ip_header_len,
        total_length,
        transport,
        frame_len: frame.len(),
        payload,
    }))
}

/// `frame[offset..offset + len]`을 반환하거나 잘림 에러를 반환합니다.
fn need(frame: &[u8], offset: usize, len: usize, layer: Layer) -> Result<&[u8], MalformedPacket> {
    offset
        .checked_add(len)
        .and_then(|end| frame.get(offset..end))
        .ok_or(MalformedPacket::Truncated {
            layer,
            need: offset.saturating_add(len),
            have: frame.len(),
        })
}

fn be16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

/// 합성 프레임 생성기
///
/// 통합 테스트, 벤치마크, 퍼저에서 공용으로 씁니다. 체크섬은 채우지 않습니다.
pub mod frames {
    use std::net::Ipv4Addr;

    use pktgate_common::{PROTO_ICMP, PROTO_TCP, PROTO_UDP};

    fn eth_ipv4(protocol: u8, src: Ipv4Addr, dst: Ipv4Addr, l4: &[u8]) -> Vec<u8> {
        let total = 20 + l4.len();
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        frame[13] = 0x00;
        frame.extend_from_slice(&[0x45, 0]);
        frame.extend_from_slice(&(total as u16).to_be_bytes());
        frame.extend_from_slice(&[0, 0, 0x40, 0, 64, protocol, 0, 0]);
        frame.extend_from_slice(&src.octets());
        frame.extend_from_slice(&dst.octets());
        frame.extend_from_slice(l4);
        frame
    }

    /// TCP 프레임 (doff = 5)
    pub fn tcp(
        src: Ipv4Addr,
        dst: Ipv4Addr,
        sport: u16,
        dport: u16,
        flags: u8,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut l4 = Vec::with_capacity(20 + payload.len());
        l4.extend_from_slice(&sport.to_be_bytes());
        l4.extend_from_slice(&dport.to_be_bytes());
        l4.extend_from_slice(&[0; 8]);
        l4.push(0x50);
        l4.push(flags);
        l4.extend_from_slice(&[0xff, 0xff, 0, 0, 0, 0]);
        l4.extend_from_slice(payload);
        eth_ipv4(PROTO_TCP, src, dst, &l4)
    }

    /// UDP 프레임
    pub fn udp(src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
        let mut l4 = Vec::with_capacity(8 + payload.len());
        l4.extend_from_slice(&sport.to_be_bytes());
        l4.extend_from_slice(&dport.to_be_bytes());
        l4.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        l4.extend_from_slice(&[0, 0]);
        l4.extend_from_slice(payload);
        eth_ipv4(PROTO_UDP, src, dst, &l4)
    }

    /// ICMP 프레임
    pub fn icmp(src: Ipv4Addr, dst: Ipv4Addr, icmp_type: u8, code: u8) -> Vec<u8> {
        eth_ipv4(PROTO_ICMP, src, dst, &[icmp_type, code, 0, 0, 0, 1, 0, 1])
    }

    /// 임의 프로토콜 IPv4 프레임
    pub fn ipv4_raw(protocol: u8, src: Ipv4Addr, dst: Ipv4Addr, body: &[u8]) -> Vec<u8> {
        eth_ipv4(protocol, src, dst, body)
    }
}

#[cfg(test)]
mod tests {
    use super::frames;
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn expect_ipv4(frame: &[u8]) -> Ipv4Packet<'_> {
        match parse(frame).unwrap() {
            Parsed::Ipv4(p) => p,
            other => panic!("expected IPv4, got {:?}", other),
        }
    }

    // =============================================================================
    // 정상 파싱
    // =============================================================================

    #[test]
    fn parses_tcp_ports_flags_and_payload() {
        let frame = frames::tcp(ip("192.168.1.10"), ip("10.0.0.5"), 40000, 443, 0x18, b"hello");
        let pkt = expect_ipv4(&frame);

        assert_eq!(pkt.src_ip, ip("192.168.1.10"));
        assert_eq!(pkt.dst_ip, ip("10.0.0.5"));
        assert_eq!(pkt.protocol, PROTO_TCP);
        assert_eq!(pkt.ip_header_len, 20);

        let t = pkt.transport.unwrap();
        assert_eq!(t.src_port, 40000);
        assert_eq!(t.dst_port, 443);
        assert_eq!(t.tcp_flags, 0x18);
        assert_eq!(t.payload_offset, 54);
        assert_eq!(pkt.payload(), b"hello");
    }

    #[test]
    fn parses_udp() {
        let frame = frames::udp(ip("1.2.3.4"), ip("5.6.7.8"), 5353, 53, b"q");
        let pkt = expect_ipv4(&frame);
        let t = pkt.transport.unwrap();
        assert_eq!((t.src_port, t.dst_port), (5353, 53));
        assert_eq!(t.payload_offset, 42);
        assert_eq!(pkt.payload(), b"q");
    }

    #[test]
    fn icmp_port_is_type_and_code() {
        let frame = frames::icmp(ip("1.1.1.1"), ip("2.2.2.2"), 8, 0);
        let pkt = expect_ipv4(&frame);
        let t = pkt.transport.unwrap();
        assert_eq!(t.src_port, 0);
        assert_eq!(t.dst_port, 8 << 8);

        let frame = frames::icmp(ip("1.1.1.1"), ip("2.2.2.2"), 3, 3);
        let t = expect_ipv4(&frame).transport.unwrap();
        assert_eq!(t.dst_port, 0x0303);
    }

    #[test]
    fn tcp_options_shift_payload_offset() {
        let mut frame = frames::tcp(ip("1.1.1.1"), ip("2.2.2.2"), 1, 2, 0x02, &[]);
        // doff = 8 (12바이트 옵션) + 옵션 바이트 추가
        frame[14 + 20 + 12] = 0x80;
        frame.extend_from_slice(&[1; 12]);
        frame.extend_from_slice(b"data");
        // total_length 갱신
        let total = (frame.len() - 14) as u16;
        frame[16..18].copy_from_slice(&total.to_be_bytes());

        let pkt = expect_ipv4(&frame);
        assert_eq!(pkt.transport.unwrap().payload_offset, 14 + 20 + 32);
        assert_eq!(pkt.payload(), b"data");
    }

    #[test]
    fn ethernet_padding_is_excluded_from_payload() {
        let mut frame = frames::udp(ip("1.1.1.1"), ip("2.2.2.2"), 1, 2, b"ab");
        frame.extend_from_slice(&[0; 10]);
        let pkt = expect_ipv4(&frame);
        assert_eq!(pkt.payload(), b"ab");
        assert_eq!(pkt.frame_len, frame.len());
    }

    #[test]
    fn unhandled_protocol_has_no_transport() {
        let frame = frames::ipv4_raw(47, ip("1.1.1.1"), ip("2.2.2.2"), &[0; 4]);
        let pkt = expect_ipv4(&frame);
        assert_eq!(pkt.protocol, 47);
        assert!(pkt.transport.is_none());
        assert!(pkt.flow_key().is_none());
        assert!(pkt.payload().is_empty());
    }

    #[test]
    fn flow_key_uses_host_order_fields() {
        let frame = frames::tcp(ip("10.0.0.1"), ip("10.0.0.2"), 1234, 80, 0x02, &[]);
        let key = expect_ipv4(&frame).flow_key().unwrap();
        assert_eq!(key.src_ip, 0x0a00_0001);
        assert_eq!(key.dst_ip, 0x0a00_0002);
        assert_eq!(key.src_port, 1234);
        assert_eq!(key.dst_port, 80);
        assert_eq!(key.protocol, PROTO_TCP);
    }

    // =============================================================================
    // 비-IPv4
    // =============================================================================

    #[test]
    fn non_ipv4_is_not_an_error() {
        let mut frame = vec![0u8; 60];
        frame[12] = 0x86;
        frame[13] = 0xdd;
        match parse(&frame).unwrap() {
            Parsed::NonIpv4 { eth_type } => assert_eq!(eth_type, 0x86dd),
            other => panic!("expected NonIpv4, got {:?}", other),
        }
    }

    #[test]
    fn arp_is_non_ipv4() {
        let mut frame = vec![0u8; 42];
        frame[12] = 0x08;
        frame[13] = 0x06;
        assert_eq!(parse(&frame).unwrap().eth_type(), 0x0806);
    }

    // =============================================================================
    // 손상된 헤더
    // =============================================================================

    #[test]
    fn short_ethernet_is_truncated() {
        let err = parse(&[0u8; 13]).unwrap_err();
        assert_eq!(
            err,
            MalformedPacket::Truncated {
                layer: Layer::Ethernet,
                need: 14,
                have: 13
            }
        );
    }

    #[test]
    fn every_tcp_prefix_shorter_than_headers_is_truncated() {
        let frame = frames::tcp(ip("1.1.1.1"), ip("2.2.2.2"), 1, 2, 0x02, &[]);
        for len in 0..frame.len() {
            assert!(
                parse(&frame[..len]).is_err(),
                "prefix of {} bytes should be malformed",
                len
            );
        }
        assert!(parse(&frame).is_ok());
    }

    #[test]
    fn wrong_ip_version_is_malformed() {
        let mut frame = frames::udp(ip("1.1.1.1"), ip("2.2.2.2"), 1, 2, &[]);
        frame[14] = 0x65;
        assert_eq!(parse(&frame).unwrap_err(), MalformedPacket::BadVersion(6));
    }

    #[test]
    fn short_ihl_is_malformed() {
        let mut frame = frames::udp(ip("1.1.1.1"), ip("2.2.2.2"), 1, 2, &[]);
        frame[14] = 0x44;
        assert_eq!(parse(&frame).unwrap_err(), MalformedPacket::BadHeaderLength(4));
    }

    #[test]
    fn ihl_beyond_buffer_is_truncated() {
        let mut frame = frames::udp(ip("1.1.1.1"), ip("2.2.2.2"), 1, 2, &[]);
        frame[14] = 0x4f; // 60바이트 헤더, 버퍼는 28바이트뿐
        assert!(matches!(
            parse(&frame).unwrap_err(),
            MalformedPacket::Truncated {
                layer: Layer::Ipv4,
                ..
            }
        ));
    }

    #[test]
    fn small_tcp_data_offset_is_malformed() {
        let mut frame = frames::tcp(ip("1.1.1.1"), ip("2.2.2.2"), 1, 2, 0x02, &[]);
        frame[14 + 20 + 12] = 0x40;
        assert_eq!(parse(&frame).unwrap_err(), MalformedPacket::BadDataOffset(4));
    }

    #[test]
    fn tcp_data_offset_beyond_buffer_is_truncated() {
        let mut frame = frames::tcp(ip("1.1.1.1"), ip("2.2.2.2"), 1, 2, 0x02, &[]);
        frame[14 + 20 + 12] = 0xf0;
        assert!(matches!(
            parse(&frame).unwrap_err(),
            MalformedPacket::Truncated {
                layer: Layer::Tcp,
                ..
            }
        ));
    }

    #[test]
    fn malformed_display_mentions_layer() {
        let err = parse(&[0u8; 3]).unwrap_err();
        assert!(err.to_string().contains("ethernet"));
    }

    // =============================================================================
    // 속성 테스트
    // =============================================================================

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn never_panics_on_arbitrary_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
                let _ = parse(&bytes);
            }

            #[test]
            fn payload_always_within_frame(payload in proptest::collection::vec(any::<u8>(), 0..64), cut in 0usize..128) {
                let frame = frames::tcp(
                    Ipv4Addr::new(1, 1, 1, 1),
                    Ipv4Addr::new(2, 2, 2, 2),
                    1,
                    2,
                    0x18,
                    &payload,
                );
                let end = cut.min(frame.len());
                if let Ok(Parsed::Ipv4(pkt)) = parse(&frame[..end]) {
                    prop_assert!(pkt.payload().len() <= end);
                    if let Some(t) = pkt.transport {
                        prop_assert!(t.payload_offset <= end);
                    }
                }
            }
        }
    }
}
