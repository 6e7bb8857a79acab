use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::options::Options;
use crate::splitter::{Cut, RecordScanner, ScanState};
use crate::CsvError;

/// One logical record cut from a byte stream, terminator removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFrame {
    pub bytes: BytesMut,
    pub line_number: usize,
}

/// Frames a byte stream into records, quote-aware, dropping blank lines.
///
/// Partial records stay in the read buffer until their terminator arrives,
/// so chunk boundaries never change where records end. Only bytes appended
/// since the last call are scanned.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    scanner: RecordScanner,
    scan: ScanState,
    next_line: usize,
}

impl RecordCodec {
    pub fn new(options: &Options) -> Self {
        Self {
            scanner: RecordScanner::new(options),
            scan: ScanState::new(),
            next_line: 1,
        }
    }

    fn cut(&mut self, src: &mut BytesMut, eof: bool) -> Result<Option<RecordFrame>, CsvError> {
        loop {
            match self.scanner.resume(src, &mut self.scan, eof) {
                Cut::Incomplete => return Ok(None),
                Cut::Blank {
                    consumed,
                    line_breaks,
                } => {
                    src.advance(consumed);
                    self.next_line += line_breaks;
                }
                Cut::Record {
                    len,
                    consumed,
                    line_breaks,
                } => {
                    let mut bytes = src.split_to(consumed);
                    bytes.truncate(len);
                    let line_number = self.next_line;
                    self.next_line += line_breaks;
                    return Ok(Some(RecordFrame { bytes, line_number }));
                }
            }
        }
    }
}

impl Decoder for RecordCodec {
    type Item = RecordFrame;
    type Error = CsvError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.cut(src, false)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.cut(buf, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> RecordCodec {
        RecordCodec::new(&Options::builder().has_header(false).build().unwrap())
    }

    #[test]
    fn test_waits_for_terminator() {
        let mut codec = codec();
        let mut buf = BytesMut::from(&b"a,\"b\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"c\",d\r\n\ne");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame.bytes[..], b"a,\"b\nc\",d");
        assert_eq!(frame.line_number, 1);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        let last = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(&last.bytes[..], b"e");
        assert_eq!(last.line_number, 4);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_record_fed_byte_by_byte() {
        let mut codec = codec();
        let input = b"\"x\"\"\n\"\"y\",z\r\nnext\n";
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        for b in input {
            buf.extend_from_slice(&[*b]);
            while let Some(frame) = codec.decode(&mut buf).unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].bytes[..], b"\"x\"\"\n\"\"y\",z");
        assert_eq!(frames[1].line_number, 3);
        assert_eq!(&frames[1].bytes[..], b"next");
    }
}
