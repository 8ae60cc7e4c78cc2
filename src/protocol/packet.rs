//! Packet construction and batched framing
//!
//! A packet is an opcode byte followed by payload fields appended in call
//! order; each opcode implies a fixed field sequence known to both ends. A
//! packet group frames a batch of packets as one reply.

use bytes::{BufMut, BytesMut};

use super::codec::{CodecError, CodecResult, Reader, Value};
use super::RamClass;

/// A single protocol message under construction. Treated as immutable once
/// handed to a [`PacketGroup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    data: BytesMut,
}

impl Packet {
    pub fn new(opcode: u8) -> Self {
        let mut data = BytesMut::with_capacity(64);
        data.put_u8(opcode);
        Self { data }
    }

    /// Rehydrate a packet from its raw wire bytes (group decoding).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
        }
    }

    pub fn opcode(&self) -> Option<u8> {
        self.data.first().copied()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn write_byte(&mut self, b: u8) {
        self.data.put_u8(b);
    }

    pub fn write_short(&mut self, v: u16) {
        self.data.put_u16_le(v);
    }

    pub fn write_signed_short(&mut self, v: i16) {
        self.data.put_u16_le((i32::from(v) + 32768) as u16);
    }

    /// Unsigned int with the writer-side range cap of 2^31 - 1.
    pub fn write_int(&mut self, v: u32) -> CodecResult<()> {
        if v > i32::MAX as u32 {
            return Err(CodecError::IntOutOfRange(v));
        }
        self.data.put_u32_le(v);
        Ok(())
    }

    pub fn write_signed_int(&mut self, v: i32) {
        self.data
            .put_u32_le((i64::from(v) + 2_147_483_648) as u32);
    }

    pub fn write_long(&mut self, v: u64) {
        self.data.put_u64_le(v);
    }

    pub fn write_signed_long(&mut self, v: i64) {
        self.data.put_u64_le((v as u64).wrapping_add(1 << 63));
    }

    /// Length-prefixed Latin-1 string; every character must fit one byte.
    pub fn write_string(&mut self, s: &str) -> CodecResult<()> {
        let len = s.chars().count();
        if len > 65535 {
            return Err(CodecError::StringTooLong(len));
        }
        self.data.put_u16_le(len as u16);
        for ch in s.chars() {
            let code = u32::from(ch);
            if code > 0xFF {
                return Err(CodecError::NonLatin1(ch));
            }
            self.data.put_u8(code as u8);
        }
        Ok(())
    }

    pub fn write_server_code(&mut self, class: RamClass) {
        self.data.put_u8(class as u8);
    }

    /// Array with one leading element-type tag, inferred from the first
    /// element. An empty array encodes as tag 0 with count 0.
    pub fn write_typed_array(&mut self, values: &[Value]) -> CodecResult<()> {
        match values.first() {
            None => {
                self.data.put_u8(0);
                self.data.put_u16_le(0);
            }
            Some(first) => {
                self.write_value_tag(first)?;
                self.data.put_u16_le(values.len() as u16);
                for value in values {
                    self.write_value(value)?;
                }
            }
        }
        Ok(())
    }

    /// Array carrying an inferred type tag per element.
    pub fn write_mixed_array(&mut self, values: &[Value]) -> CodecResult<()> {
        self.data.put_u16_le(values.len() as u16);
        for value in values {
            self.write_value_tag(value)?;
            self.write_value(value)?;
        }
        Ok(())
    }

    // Inference covers byte blobs, unsigned integers, strings and nested
    // sequences. Booleans, signed integers and nested typed arrays are only
    // representable through explicit writes.
    fn write_value_tag(&mut self, value: &Value) -> CodecResult<()> {
        let tag = match value {
            Value::Byte(_) => 0x00,
            Value::Short(_) => 0x01,
            Value::Int(_) => 0x03,
            Value::Str(_) => 0x05,
            Value::List(_) => 0x07,
            other => return Err(CodecError::UnsupportedKind(other.kind())),
        };
        self.data.put_u8(tag);
        Ok(())
    }

    fn write_value(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Byte(b) => self.write_byte(*b),
            Value::Short(v) => self.write_short(*v),
            Value::Int(v) => self.write_int(*v)?,
            Value::Str(s) => self.write_string(s)?,
            Value::List(values) => self.write_mixed_array(values)?,
            other => return Err(CodecError::UnsupportedKind(other.kind())),
        }
        Ok(())
    }
}

/// An ordered batch of packets framed as a single reply: a 2-byte packet
/// count, then per packet a 2-byte length prefix and the raw bytes. The
/// empty group is the canonical "acknowledge, nothing to deliver".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketGroup {
    packets: Vec<Packet>,
}

impl PacketGroup {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(packets: Vec<Packet>) -> Self {
        Self { packets }
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn into_packets(self) -> Vec<Packet> {
        self.packets
    }

    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        if self.packets.len() > 65535 {
            return Err(CodecError::GroupTooLarge(self.packets.len()));
        }
        let mut out = Vec::with_capacity(2 + self.packets.iter().map(|p| p.len() + 2).sum::<usize>());
        out.extend_from_slice(&(self.packets.len() as u16).to_le_bytes());
        for packet in &self.packets {
            if packet.len() > 65535 {
                return Err(CodecError::PacketTooLarge(packet.len()));
            }
            out.extend_from_slice(&(packet.len() as u16).to_le_bytes());
            out.extend_from_slice(packet.as_bytes());
        }
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let mut reader = Reader::new(data);
        let count = usize::from(reader.read_short()?);
        let mut packets = Vec::with_capacity(count);
        for _ in 0..count {
            let len = usize::from(reader.read_short()?);
            packets.push(Packet::from_bytes(reader.read_bytes(len)?));
        }
        Ok(Self { packets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_reader(packet: &Packet) -> Reader<'_> {
        Reader::new(&packet.as_bytes()[1..])
    }

    #[test]
    fn test_signed_short_roundtrip() {
        let mut pkt = Packet::new(0x00);
        for v in [i16::MIN, -1, 0, 1, i16::MAX] {
            pkt.write_signed_short(v);
        }
        let mut r = payload_reader(&pkt);
        for v in [i16::MIN, -1, 0, 1, i16::MAX] {
            assert_eq!(r.read_signed_short().unwrap(), v);
        }
    }

    #[test]
    fn test_signed_int_roundtrip() {
        let mut pkt = Packet::new(0x00);
        for v in [i32::MIN, -1, 0, 1, i32::MAX] {
            pkt.write_signed_int(v);
        }
        let mut r = payload_reader(&pkt);
        for v in [i32::MIN, -1, 0, 1, i32::MAX] {
            assert_eq!(r.read_signed_int().unwrap(), v);
        }
    }

    #[test]
    fn test_signed_long_roundtrip() {
        let mut pkt = Packet::new(0x00);
        for v in [i64::MIN, -1, 0, 1, i64::MAX] {
            pkt.write_signed_long(v);
        }
        let mut r = payload_reader(&pkt);
        for v in [i64::MIN, -1, 0, 1, i64::MAX] {
            assert_eq!(r.read_signed_long().unwrap(), v);
        }
    }

    #[test]
    fn test_unsigned_boundaries() {
        let mut pkt = Packet::new(0x00);
        pkt.write_short(0);
        pkt.write_short(u16::MAX);
        pkt.write_int(0).unwrap();
        pkt.write_int(i32::MAX as u32).unwrap();
        pkt.write_long(0);
        pkt.write_long(u64::MAX);
        let mut r = payload_reader(&pkt);
        assert_eq!(r.read_short().unwrap(), 0);
        assert_eq!(r.read_short().unwrap(), u16::MAX);
        assert_eq!(r.read_int().unwrap(), 0);
        assert_eq!(r.read_int().unwrap(), i32::MAX as u32);
        assert_eq!(r.read_long().unwrap(), 0);
        assert_eq!(r.read_long().unwrap(), u64::MAX);
    }

    #[test]
    fn test_write_int_range_cap() {
        let mut pkt = Packet::new(0x00);
        assert!(matches!(
            pkt.write_int(1 << 31),
            Err(CodecError::IntOutOfRange(_))
        ));
    }

    #[test]
    fn test_string_roundtrip() {
        let mut pkt = Packet::new(0x00);
        pkt.write_string("").unwrap();
        pkt.write_string("hello").unwrap();
        pkt.write_string("caf\u{e9} \u{ff}").unwrap();
        let long: String = std::iter::repeat('x').take(65535).collect();
        pkt.write_string(&long).unwrap();

        let mut r = payload_reader(&pkt);
        assert_eq!(r.read_string().unwrap(), "");
        assert_eq!(r.read_string().unwrap(), "hello");
        assert_eq!(r.read_string().unwrap(), "caf\u{e9} \u{ff}");
        assert_eq!(r.read_string().unwrap(), long);
    }

    #[test]
    fn test_string_rejections() {
        let mut pkt = Packet::new(0x00);
        assert!(matches!(
            pkt.write_string("\u{100}"),
            Err(CodecError::NonLatin1('\u{100}'))
        ));
        let too_long: String = std::iter::repeat('x').take(65536).collect();
        assert!(matches!(
            pkt.write_string(&too_long),
            Err(CodecError::StringTooLong(65536))
        ));
    }

    #[test]
    fn test_mixed_array_roundtrip() {
        let values = vec![
            Value::Byte(0xAB),
            Value::Short(1234),
            Value::Int(70000),
            Value::Str("player".into()),
            Value::List(vec![Value::Str("nested".into())]),
        ];
        let mut pkt = Packet::new(0x00);
        pkt.write_mixed_array(&values).unwrap();
        let mut r = payload_reader(&pkt);
        assert_eq!(r.read_mixed_array().unwrap(), values);
    }

    #[test]
    fn test_typed_array_roundtrip() {
        let values = vec![Value::Short(1), Value::Short(2), Value::Short(3)];
        let mut pkt = Packet::new(0x00);
        pkt.write_typed_array(&values).unwrap();
        let mut r = payload_reader(&pkt);
        assert_eq!(r.read_typed_array().unwrap(), values);
    }

    #[test]
    fn test_empty_typed_array() {
        let mut pkt = Packet::new(0x00);
        pkt.write_typed_array(&[]).unwrap();
        assert_eq!(&pkt.as_bytes()[1..], &[0x00, 0x00, 0x00]);
        let mut r = payload_reader(&pkt);
        assert_eq!(r.read_typed_array().unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn test_inference_rejects_booleans() {
        let mut pkt = Packet::new(0x00);
        assert!(matches!(
            pkt.write_mixed_array(&[Value::Bool(true)]),
            Err(CodecError::UnsupportedKind("boolean"))
        ));
    }

    #[test]
    fn test_group_roundtrip_empty() {
        let group = PacketGroup::empty();
        let bytes = group.encode().unwrap();
        assert_eq!(bytes, vec![0x00, 0x00]);
        assert_eq!(PacketGroup::decode(&bytes).unwrap(), group);
    }

    #[test]
    fn test_group_roundtrip_single() {
        let mut pkt = Packet::new(0xC4);
        pkt.write_string("Server Not Found!").unwrap();
        let group = PacketGroup::new(vec![pkt]);
        let decoded = PacketGroup::decode(&group.encode().unwrap()).unwrap();
        assert_eq!(decoded, group);
        assert_eq!(decoded.packets()[0].opcode(), Some(0xC4));
    }

    #[test]
    fn test_group_roundtrip_many() {
        let mut packets = Vec::new();
        for i in 0..17u16 {
            let mut pkt = Packet::new(0xE9);
            pkt.write_short(i);
            pkt.write_string(&"x".repeat(usize::from(i) * 31)).unwrap();
            packets.push(pkt);
        }
        let group = PacketGroup::new(packets);
        assert_eq!(PacketGroup::decode(&group.encode().unwrap()).unwrap(), group);
    }

    #[test]
    fn test_group_truncated() {
        let mut pkt = Packet::new(0x01);
        pkt.write_short(7);
        let bytes = PacketGroup::new(vec![pkt]).encode().unwrap();
        assert!(matches!(
            PacketGroup::decode(&bytes[..bytes.len() - 1]),
            Err(CodecError::Truncated { .. })
        ));
    }
}
