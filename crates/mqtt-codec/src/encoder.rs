//! MQTT encoder: packet → byte stream.
//!
//! Each packet type's variable-header-plus-payload length is computed
//! analytically before any bytes are written, so the fixed header's
//! remaining-length field never needs a second pass over a scratch
//! buffer. PUBLISH is the one exception to "one packet, one buffer": its
//! payload is handed back untouched (zero-copy, one extra `retain`) as a
//! second output buffer rather than copied alongside the header.

use pipeline_core::buffer::BufferAllocator;
use pipeline_core::ByteBuf;

use crate::error::EncoderError;
use crate::packet::{ConnAck, Connect, Packet, PacketId, Publish, SubAck, Subscribe, Unsubscribe};
use crate::qos::QoS;
use crate::strings;
use crate::varint;

fn write_fixed_header(buf: &mut ByteBuf, packet_type: u8, flags: u8, remaining_length: u32) -> Result<(), EncoderError> {
    buf.write_byte((packet_type << 4) | flags)?;
    varint::encode_remaining_length(buf, remaining_length)?;
    Ok(())
}

fn connect_body_len(c: &Connect) -> usize {
    let mut len = strings::encoded_len(c.protocol_name.len()) + 1 /* level */ + 1 /* flags */ + 2 /* keep alive */;
    len += strings::encoded_len(c.client_id.len());
    if let Some(will) = &c.will {
        len += strings::encoded_len(will.topic.len());
        len += strings::encoded_len(will.message.len());
    }
    if let Some(username) = &c.username {
        len += strings::encoded_len(username.len());
    }
    if let Some(password) = &c.password {
        len += strings::encoded_len(password.len());
    }
    len
}

fn connect_flags(c: &Connect) -> u8 {
    let mut flags = 0u8;
    if c.clean_session {
        flags |= 0x02;
    }
    if let Some(will) = &c.will {
        flags |= 0x04;
        flags |= will.qos.bits() << 3;
        if will.retain {
            flags |= 0x20;
        }
    }
    if c.password.is_some() {
        flags |= 0x40;
    }
    if c.username.is_some() {
        flags |= 0x80;
    }
    flags
}

fn encode_connect(c: &Connect, allocator: &dyn BufferAllocator) -> Result<ByteBuf, EncoderError> {
    let body_len = connect_body_len(c);
    let mut buf = allocator.allocate(2 + varint::encoded_len(body_len as u32) + body_len);
    write_fixed_header(&mut buf, 1, 0, body_len as u32)?;
    strings::write_string(&mut buf, &c.protocol_name)?;
    buf.write_byte(c.protocol_level)?;
    buf.write_byte(connect_flags(c))?;
    buf.write_u16_be(c.keep_alive)?;
    strings::write_string(&mut buf, &c.client_id)?;
    if let Some(will) = &c.will {
        strings::write_string(&mut buf, &will.topic)?;
        strings::write_binary(&mut buf, &will.message)?;
    }
    if let Some(username) = &c.username {
        strings::write_string(&mut buf, username)?;
    }
    if let Some(password) = &c.password {
        strings::write_string(&mut buf, password)?;
    }
    Ok(buf)
}

fn encode_connack(ack: &ConnAck, allocator: &dyn BufferAllocator) -> Result<ByteBuf, EncoderError> {
    let mut buf = allocator.allocate(4);
    write_fixed_header(&mut buf, 2, 0, 2)?;
    buf.write_byte(if ack.session_present { 0x01 } else { 0x00 })?;
    buf.write_byte(ack.return_code.to_byte())?;
    Ok(buf)
}

fn encode_packet_id_only(packet_type: u8, id: PacketId, flags: u8, allocator: &dyn BufferAllocator) -> Result<ByteBuf, EncoderError> {
    let mut buf = allocator.allocate(4);
    write_fixed_header(&mut buf, packet_type, flags, 2)?;
    buf.write_u16_be(id.get())?;
    Ok(buf)
}

fn encode_subscribe(s: &Subscribe, allocator: &dyn BufferAllocator) -> Result<ByteBuf, EncoderError> {
    let body_len: usize = 2 + s
        .requests
        .iter()
        .map(|r| strings::encoded_len(r.topic_filter.len()) + 1)
        .sum::<usize>();
    let mut buf = allocator.allocate(2 + varint::encoded_len(body_len as u32) + body_len);
    write_fixed_header(&mut buf, 8, 0b0010, body_len as u32)?;
    buf.write_u16_be(s.packet_id.get())?;
    for request in &s.requests {
        strings::write_string(&mut buf, &request.topic_filter)?;
        buf.write_byte(request.requested_qos.bits())?;
    }
    Ok(buf)
}

fn encode_suback(ack: &SubAck, allocator: &dyn BufferAllocator) -> Result<ByteBuf, EncoderError> {
    let body_len = 2 + ack.return_codes.len();
    let mut buf = allocator.allocate(2 + varint::encoded_len(body_len as u32) + body_len);
    write_fixed_header(&mut buf, 9, 0, body_len as u32)?;
    buf.write_u16_be(ack.packet_id.get())?;
    for code in &ack.return_codes {
        buf.write_byte(code.to_byte())?;
    }
    Ok(buf)
}

fn encode_unsubscribe(u: &Unsubscribe, allocator: &dyn BufferAllocator) -> Result<ByteBuf, EncoderError> {
    let body_len: usize = 2 + u.topic_filters.iter().map(|f| strings::encoded_len(f.len())).sum::<usize>();
    let mut buf = allocator.allocate(2 + varint::encoded_len(body_len as u32) + body_len);
    write_fixed_header(&mut buf, 10, 0b0010, body_len as u32)?;
    buf.write_u16_be(u.packet_id.get())?;
    for filter in &u.topic_filters {
        strings::write_string(&mut buf, filter)?;
    }
    Ok(buf)
}

fn encode_unsuback(id: PacketId, allocator: &dyn BufferAllocator) -> Result<ByteBuf, EncoderError> {
    encode_packet_id_only(11, id, 0, allocator)
}

fn encode_empty(packet_type: u8, allocator: &dyn BufferAllocator) -> Result<ByteBuf, EncoderError> {
    let mut buf = allocator.allocate(2);
    write_fixed_header(&mut buf, packet_type, 0, 0)?;
    Ok(buf)
}

fn publish_flags(p: &Publish) -> u8 {
    let mut flags = p.qos.bits() << 1;
    if p.dup {
        flags |= 0x08;
    }
    if p.retain {
        flags |= 0x01;
    }
    flags
}

/// Encodes `p`'s header and variable header into one buffer; the payload
/// buffer is returned separately, retained once so it survives
/// independently of `p` — the same "retain exactly once per hop" rule
/// applies symmetrically to the encoder's payload hand-off.
fn encode_publish(p: &Publish, allocator: &dyn BufferAllocator) -> Result<(ByteBuf, ByteBuf), EncoderError> {
    if matches!(p.qos, QoS::AtLeastOnce | QoS::ExactlyOnce) && p.packet_id.is_none() {
        return Err(EncoderError::InconsistentPacket("PUBLISH with QoS > 0 must carry a packet id"));
    }
    if matches!(p.qos, QoS::AtMostOnce) && p.packet_id.is_some() {
        return Err(EncoderError::InconsistentPacket("PUBLISH with QoS 0 must not carry a packet id"));
    }

    let has_id = p.packet_id.is_some();
    let variable_header_len = strings::encoded_len(p.topic_name.len()) + if has_id { 2 } else { 0 };
    let body_len = variable_header_len + p.payload.readable_bytes();

    let mut header = allocator.allocate(2 + varint::encoded_len(body_len as u32) + variable_header_len);
    write_fixed_header(&mut header, 3, publish_flags(p), body_len as u32)?;
    strings::write_string(&mut header, &p.topic_name)?;
    if let Some(id) = p.packet_id {
        header.write_u16_be(id)?;
    }

    let payload = p.payload.duplicate();
    payload.retain();
    Ok((header, payload))
}

/// The encoded form of one packet: most packet types produce a single
/// buffer, PUBLISH produces a header buffer and its (retained) payload.
pub enum Encoded {
    Single(ByteBuf),
    Publish(ByteBuf, ByteBuf),
}

pub fn encode_packet(packet: &Packet, allocator: &dyn BufferAllocator) -> Result<Encoded, EncoderError> {
    match packet {
        Packet::Connect(c) => encode_connect(c, allocator).map(Encoded::Single),
        Packet::ConnAck(ack) => encode_connack(ack, allocator).map(Encoded::Single),
        Packet::Publish(p) => {
            let (header, payload) = encode_publish(p, allocator)?;
            Ok(Encoded::Publish(header, payload))
        }
        Packet::PubAck(id) => encode_packet_id_only(4, *id, 0, allocator).map(Encoded::Single),
        Packet::PubRec(id) => encode_packet_id_only(5, *id, 0, allocator).map(Encoded::Single),
        Packet::PubRel(id) => encode_packet_id_only(6, *id, 0b0010, allocator).map(Encoded::Single),
        Packet::PubComp(id) => encode_packet_id_only(7, *id, 0, allocator).map(Encoded::Single),
        Packet::Subscribe(s) => encode_subscribe(s, allocator).map(Encoded::Single),
        Packet::SubAck(ack) => encode_suback(ack, allocator).map(Encoded::Single),
        Packet::Unsubscribe(u) => encode_unsubscribe(u, allocator).map(Encoded::Single),
        Packet::UnsubAck(id) => encode_unsuback(*id, allocator).map(Encoded::Single),
        Packet::PingReq => encode_empty(12, allocator).map(Encoded::Single),
        Packet::PingResp => encode_empty(13, allocator).map(Encoded::Single),
        Packet::Disconnect => encode_empty(14, allocator).map(Encoded::Single),
    }
}
