//! Byte frames exchanged with the handler side
//!
//! All integers are little-endian; strings and the body carry a `u32`
//! length prefix, header and param lists a `u16` count.
//!
//! ```text
//! request:  u8 method | u64 request_id | str path | str query
//!           | u16 n + (str name, str value)* headers
//!           | u16 n + (str name, str value)* params
//!           | u32 len + body
//! response: u16 status | u16 n + (str name, str value)* headers | u32 len + body
//! ```
//!
//! An absent query is encoded as an empty string.

use crate::dispatch::DispatchRequest;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use ferry_router::Method;
use http::StatusCode;
use smallvec::SmallVec;
use thiserror::Error;

/// Frame encoding and decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("frame contains invalid UTF-8")]
    InvalidUtf8,

    #[error("invalid method code {0}")]
    InvalidMethod(u8),

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("{0} bytes left over after frame")]
    TrailingBytes(usize),

    #[error("{0} does not fit in a frame")]
    Oversized(&'static str),
}

type Result<T> = std::result::Result<T, FrameError>;

/// Response frame produced by the handler side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ResponseFrame {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(8 + self.body.len());
        buf.put_u16_le(self.status);
        put_pairs(&mut buf, self.headers.iter(), "response headers")?;
        put_bytes(&mut buf, &self.body, "response body")?;
        Ok(buf.freeze())
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(frame);
        let status = reader.u16()?;
        StatusCode::from_u16(status).map_err(|_| FrameError::InvalidStatus(status))?;
        let headers = reader.pairs()?;
        let body = Bytes::copy_from_slice(reader.bytes()?);
        reader.finish()?;

        Ok(Self {
            status,
            headers: headers.into_vec(),
            body,
        })
    }
}

/// Encode a request for the handler side
pub fn encode_request(request: &DispatchRequest) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(
        64 + request.path.len() + request.body.len() + request.headers.len() * 32,
    );
    buf.put_u8(request.method.code());
    buf.put_u64_le(request.request_id);
    put_bytes(&mut buf, request.path.as_bytes(), "path")?;
    put_bytes(
        &mut buf,
        request.query.as_deref().unwrap_or("").as_bytes(),
        "query",
    )?;
    put_pairs(&mut buf, request.headers.iter(), "request headers")?;
    put_pairs(&mut buf, request.params.iter(), "params")?;
    put_bytes(&mut buf, &request.body, "request body")?;
    Ok(buf.freeze())
}

/// Decode a request frame
///
/// The handler id is not part of the frame; it travels next to it.
pub fn decode_request(frame: &[u8], handler_id: u64) -> Result<DispatchRequest> {
    let mut reader = Reader::new(frame);
    let code = reader.u8()?;
    let method = Method::from_u8(code).ok_or(FrameError::InvalidMethod(code))?;
    let request_id = reader.u64()?;
    let path = reader.string()?;
    let query = Some(reader.string()?).filter(|q| !q.is_empty());
    let headers = reader.pairs()?;
    let params = reader.pairs()?.into_vec();
    let body = Bytes::copy_from_slice(reader.bytes()?);
    reader.finish()?;

    Ok(DispatchRequest {
        request_id,
        handler_id,
        method,
        path,
        query,
        headers,
        params,
        body,
    })
}

fn put_bytes(buf: &mut BytesMut, bytes: &[u8], what: &'static str) -> Result<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| FrameError::Oversized(what))?;
    buf.put_u32_le(len);
    buf.put_slice(bytes);
    Ok(())
}

fn put_pairs<'a>(
    buf: &mut BytesMut,
    pairs: impl ExactSizeIterator<Item = &'a (String, String)>,
    what: &'static str,
) -> Result<()> {
    let count = u16::try_from(pairs.len()).map_err(|_| FrameError::Oversized(what))?;
    buf.put_u16_le(count);
    for (name, value) in pairs {
        put_bytes(buf, name.as_bytes(), what)?;
        put_bytes(buf, value.as_bytes(), what)?;
    }
    Ok(())
}

/// Bounds-checked cursor over a frame
struct Reader<'a> {
    buf: &'a [u8],
    total: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            total: buf.len(),
        }
    }

    #[inline]
    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(FrameError::Truncated {
                offset: self.total - self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn string(&mut self) -> Result<String> {
        let bytes = self.bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| FrameError::InvalidUtf8)
    }

    fn pairs(&mut self) -> Result<SmallVec<[(String, String); 16]>> {
        let count = self.u16()?;
        let mut pairs = SmallVec::with_capacity(count as usize);
        for _ in 0..count {
            let name = self.string()?;
            let value = self.string()?;
            pairs.push((name, value));
        }
        Ok(pairs)
    }

    fn finish(self) -> Result<()> {
        match self.buf.len() {
            0 => Ok(()),
            left => Err(FrameError::TrailingBytes(left)),
        }
    }
}
