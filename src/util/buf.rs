use anyhow::anyhow;
use bytes::{Buf, BufMut, Bytes};
use uuid::Uuid;


pub fn put_uuid(buf: &mut impl BufMut, id: Uuid) {
    buf.put_slice(id.as_bytes());
}

pub fn try_get_uuid(buf: &mut impl Buf) -> anyhow::Result<Uuid> {
    if buf.remaining() < 16 {
        return Err(anyhow!("buffer ends in the middle of a UUID"));
    }
    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes);
    Ok(Uuid::from_bytes(bytes))
}

pub fn try_copy_bytes(buf: &mut impl Buf, len: usize) -> anyhow::Result<Bytes> {
    if buf.remaining() < len {
        return Err(anyhow!("buffer ends inside a payload of {} bytes, only {} left", len, buf.remaining()));
    }
    Ok(buf.copy_to_bytes(len))
}
