//! PDF Stream Filters
//!
//! Individual decoders of ISO 32000-1 Section 7.4. A failing decoder never raises:
//! it reports a [`FilterFailure`] carrying whatever it produced before the failure.
//! Image codecs (DCT, JPX, JBIG2, CCITT) are passed through untouched.

#[cfg(feature = "compression")]
use flate2::read::ZlibDecoder;
use std::fmt;
#[cfg(feature = "compression")]
use std::io::Read;
use weezl::{decode::Decoder as LzwDecoder, BitOrder};

use super::objects::PdfDictionary;

/// Supported PDF filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    /// ASCII hex decode
    ASCIIHexDecode,

    /// ASCII 85 decode
    ASCII85Decode,

    /// LZW decode
    LZWDecode,

    /// Flate decode (zlib/deflate compression)
    FlateDecode,

    /// Run length decode
    RunLengthDecode,

    /// CCITT fax decode
    CCITTFaxDecode,

    /// JBIG2 decode
    JBIG2Decode,

    /// DCT decode (JPEG)
    DCTDecode,

    /// JPX decode (JPEG 2000)
    JPXDecode,

    /// Crypt filter
    Crypt,
}

impl Filter {
    /// Parse filter from name, ignoring case and accepting the inline image abbreviations
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix('/').unwrap_or(name).to_ascii_lowercase();
        match name.as_str() {
            "asciihexdecode" | "ahx" => Some(Filter::ASCIIHexDecode),
            "ascii85decode" | "a85" => Some(Filter::ASCII85Decode),
            "lzwdecode" | "lzw" => Some(Filter::LZWDecode),
            "flatedecode" | "fl" => Some(Filter::FlateDecode),
            "runlengthdecode" | "rl" => Some(Filter::RunLengthDecode),
            "ccittfaxdecode" | "ccf" => Some(Filter::CCITTFaxDecode),
            "jbig2decode" => Some(Filter::JBIG2Decode),
            "dctdecode" | "dct" => Some(Filter::DCTDecode),
            "jpxdecode" => Some(Filter::JPXDecode),
            "crypt" => Some(Filter::Crypt),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Filter::ASCIIHexDecode => "ASCIIHexDecode",
            Filter::ASCII85Decode => "ASCII85Decode",
            Filter::LZWDecode => "LZWDecode",
            Filter::FlateDecode => "FlateDecode",
            Filter::RunLengthDecode => "RunLengthDecode",
            Filter::CCITTFaxDecode => "CCITTFaxDecode",
            Filter::JBIG2Decode => "JBIG2Decode",
            Filter::DCTDecode => "DCTDecode",
            Filter::JPXDecode => "JPXDecode",
            Filter::Crypt => "Crypt",
        }
    }

    /// Image codecs whose output is left encoded
    pub fn is_opaque(&self) -> bool {
        matches!(
            self,
            Filter::CCITTFaxDecode | Filter::JBIG2Decode | Filter::DCTDecode | Filter::JPXDecode
        )
    }

    /// Decode `data`. The crypt filter is resolved by the pipeline and is the identity here.
    pub fn decode(&self, data: &[u8], params: &DecodeParams) -> Result<Vec<u8>, FilterFailure> {
        match self {
            Filter::FlateDecode => {
                let inflated = decode_flate(data)?;
                apply_predictor(inflated, params, data.len())
            }
            Filter::LZWDecode => {
                let expanded = decode_lzw(data, params.early_change)?;
                apply_predictor(expanded, params, data.len())
            }
            Filter::ASCIIHexDecode => decode_ascii_hex(data),
            Filter::ASCII85Decode => decode_ascii85(data),
            Filter::RunLengthDecode => decode_run_length(data),
            Filter::Crypt
            | Filter::CCITTFaxDecode
            | Filter::JBIG2Decode
            | Filter::DCTDecode
            | Filter::JPXDecode => Ok(data.to_vec()),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

/// A decoder that stopped early.
///
/// `filter_index` is set by the pipeline; decoders leave it at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterFailure {
    pub filter_index: usize,
    /// Output produced before the failure
    pub partial_output: Vec<u8>,
    /// Input bytes consumed before the failure
    pub bytes_processed: usize,
    pub message: String,
}

impl FilterFailure {
    pub fn new(partial_output: Vec<u8>, bytes_processed: usize, message: impl Into<String>) -> Self {
        Self {
            filter_index: 0,
            partial_output,
            bytes_processed,
            message: message.into(),
        }
    }

    pub fn at_index(mut self, filter_index: usize) -> Self {
        self.filter_index = filter_index;
        self
    }
}

impl fmt::Display for FilterFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "filter [{}] failed after {} bytes: {}",
            self.filter_index, self.bytes_processed, self.message
        )
    }
}

impl std::error::Error for FilterFailure {}

/// `/DecodeParms` entries used by the decoders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeParams {
    pub predictor: i64,
    pub colors: i64,
    pub bits_per_component: i64,
    pub columns: i64,
    pub early_change: i64,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
            early_change: 1,
        }
    }
}

impl DecodeParams {
    /// Build from a key lookup returning integer values
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<i64>) -> Self {
        let defaults = Self::default();
        Self {
            predictor: lookup("Predictor").unwrap_or(defaults.predictor),
            colors: lookup("Colors").unwrap_or(defaults.colors),
            bits_per_component: lookup("BitsPerComponent").unwrap_or(defaults.bits_per_component),
            columns: lookup("Columns").unwrap_or(defaults.columns),
            early_change: lookup("EarlyChange").unwrap_or(defaults.early_change),
        }
    }

    /// Build from direct integer entries of a dictionary
    pub fn from_dict(dict: &PdfDictionary) -> Self {
        Self::from_lookup(|key| dict.get(key).and_then(|value| value.as_integer()))
    }

    fn bytes_per_pixel(&self) -> Option<usize> {
        let bits = self.colors.checked_mul(self.bits_per_component)?;
        usize::try_from(bits.checked_add(7)? / 8).ok().filter(|bpp| *bpp > 0)
    }

    /// Bytes per row, `None` when the parameters overflow
    fn row_length(&self) -> Option<usize> {
        let bits = self
            .colors
            .checked_mul(self.bits_per_component)?
            .checked_mul(self.columns)?;
        usize::try_from(bits.checked_add(7)? / 8).ok().filter(|len| *len > 0)
    }

    fn has_layout(&self) -> bool {
        self.colors > 0 && self.bits_per_component > 0 && self.columns > 0
    }
}

/// Decode FlateDecode (zlib/deflate) compressed data
#[cfg(feature = "compression")]
fn decode_flate(data: &[u8]) -> Result<Vec<u8>, FilterFailure> {
    let mut decoder = ZlibDecoder::new(data);
    let mut result = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match decoder.read(&mut buf) {
            Ok(0) => return Ok(result),
            Ok(n) => result.extend_from_slice(&buf[..n]),
            Err(e) => {
                let processed = decoder.total_in() as usize;
                return Err(FilterFailure::new(
                    result,
                    processed,
                    format!("Flate decode error: {e}"),
                ));
            }
        }
    }
}

#[cfg(not(feature = "compression"))]
fn decode_flate(_data: &[u8]) -> Result<Vec<u8>, FilterFailure> {
    Err(FilterFailure::new(
        Vec::new(),
        0,
        "FlateDecode requires 'compression' feature",
    ))
}

/// Decode LZWDecode data (MSB first, 8 bit literals)
fn decode_lzw(data: &[u8], early_change: i64) -> Result<Vec<u8>, FilterFailure> {
    // EarlyChange 1 switches code size one code early, like TIFF
    let mut decoder = if early_change == 0 {
        LzwDecoder::new(BitOrder::Msb, 8)
    } else {
        LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
    };
    let mut output = Vec::new();
    let result = decoder.into_vec(&mut output).decode(data);
    match result.status {
        Ok(_) => Ok(output),
        Err(e) => Err(FilterFailure::new(
            output,
            result.consumed_in,
            format!("LZW decode error: {e}"),
        )),
    }
}

/// Decode ASCIIHexDecode data
fn decode_ascii_hex(data: &[u8]) -> Result<Vec<u8>, FilterFailure> {
    let mut result = Vec::new();
    let mut high: Option<u8> = None;
    for (position, &ch) in data.iter().enumerate() {
        if ch.is_ascii_whitespace() || ch == 0 {
            continue;
        }
        if ch == b'>' {
            break;
        }
        let Some(value) = hex_digit_value(ch) else {
            return Err(FilterFailure::new(
                result,
                position,
                format!("Invalid hex digit: {}", ch as char),
            ));
        };
        match high.take() {
            Some(h) => result.push((h << 4) | value),
            None => high = Some(value),
        }
    }
    // Odd number of digits, pad with 0
    if let Some(h) = high {
        result.push(h << 4);
    }
    Ok(result)
}

/// Get value of hex digit
fn hex_digit_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}

fn ascii85_group_value(group: &[u8]) -> Option<u32> {
    let value = group
        .iter()
        .fold(0u64, |acc, &ch| acc * 85 + u64::from(ch - b'!'));
    u32::try_from(value).ok()
}

/// Decode ASCII85Decode data
fn decode_ascii85(data: &[u8]) -> Result<Vec<u8>, FilterFailure> {
    let mut result = Vec::new();
    let mut group: Vec<u8> = Vec::with_capacity(5);
    let mut position = 0;

    // Skip optional <~ prefix
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    if data[start..].starts_with(b"<~") {
        position = start + 2;
    }

    while position < data.len() {
        let c = data[position];
        position += 1;
        match c {
            _ if c.is_ascii_whitespace() => {}
            b'~' => break,
            b'z' if group.is_empty() => {
                // 'z' represents four zero bytes
                result.extend_from_slice(&[0, 0, 0, 0]);
            }
            b'!'..=b'u' => {
                group.push(c);
                if group.len() == 5 {
                    let Some(value) = ascii85_group_value(&group) else {
                        return Err(FilterFailure::new(result, position, "ASCII85 group overflow"));
                    };
                    result.extend_from_slice(&value.to_be_bytes());
                    group.clear();
                }
            }
            _ => {
                return Err(FilterFailure::new(
                    result,
                    position - 1,
                    format!("Invalid ASCII85 character: {}", c as char),
                ));
            }
        }
    }

    // Handle incomplete final group
    if !group.is_empty() {
        let original_len = group.len();
        group.resize(5, b'u');
        let Some(value) = ascii85_group_value(&group) else {
            return Err(FilterFailure::new(result, position, "ASCII85 group overflow"));
        };
        result.extend_from_slice(&value.to_be_bytes()[..original_len - 1]);
    }

    Ok(result)
}

/// Decode RunLengthDecode data
fn decode_run_length(data: &[u8]) -> Result<Vec<u8>, FilterFailure> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < data.len() {
        let n = data[i];
        i += 1;
        if n == 128 {
            break;
        } else if n <= 127 {
            let count = (n as usize) + 1;
            if i + count > data.len() {
                out.extend_from_slice(&data[i..]);
                return Err(FilterFailure::new(out, data.len(), "Truncated literal run"));
            }
            out.extend_from_slice(&data[i..i + count]);
            i += count;
        } else {
            let count = 257 - (n as usize);
            let Some(&b) = data.get(i) else {
                return Err(FilterFailure::new(out, data.len(), "Truncated repeated run"));
            };
            out.extend(std::iter::repeat(b).take(count));
            i += 1;
        }
    }
    Ok(out)
}

/// Undo a TIFF (2) or PNG (10 to 15) predictor.
///
/// A row larger than the data fails with the unpredicted bytes as partial output;
/// `consumed` is the encoded length reported with the failure.
fn apply_predictor(data: Vec<u8>, params: &DecodeParams, consumed: usize) -> Result<Vec<u8>, FilterFailure> {
    let applies = match params.predictor {
        2 => params.bits_per_component == 8,
        10..=15 => true,
        _ => false,
    };
    if !applies || data.is_empty() || !params.has_layout() {
        return Ok(data);
    }
    let layout = params
        .bytes_per_pixel()
        .zip(params.row_length())
        .filter(|&(bpp, row_len)| bpp <= row_len && row_len <= data.len());
    let Some((bpp, row_len)) = layout else {
        let message = format!(
            "Predictor row of {} columns x {} colors exceeds {} bytes of data",
            params.columns,
            params.colors,
            data.len()
        );
        return Err(FilterFailure::new(data, consumed, message));
    };
    Ok(match params.predictor {
        2 => apply_tiff_predictor(data, bpp, row_len),
        _ => apply_png_predictor(&data, bpp, row_len),
    })
}

fn apply_tiff_predictor(mut data: Vec<u8>, bpp: usize, row_len: usize) -> Vec<u8> {
    for row in data.chunks_mut(row_len) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    data
}

fn apply_png_predictor(data: &[u8], bpp: usize, row_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];
    for chunk in data.chunks(row_len + 1) {
        let (tag, encoded) = match chunk.split_first() {
            Some(split) => split,
            None => break,
        };
        let mut row = encoded.to_vec();
        row.resize(row_len, 0);
        for j in 0..row_len {
            let left = if j >= bpp { row[j - bpp] } else { 0 };
            let up = prev[j];
            let up_left = if j >= bpp { prev[j - bpp] } else { 0 };
            let predicted = match tag {
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, up_left),
                _ => 0,
            };
            row[j] = row[j].wrapping_add(predicted);
        }
        out.extend_from_slice(&row[..encoded.len()]);
        prev = row;
    }
    out
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (a, b, c) = (i16::from(a), i16::from(b), i16::from(c));
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();
    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::{PdfNumber, PdfObject, PdfValue};

    #[test]
    fn test_ascii_hex_decode() {
        assert_eq!(decode_ascii_hex(b"48656C6C6F>").unwrap(), b"Hello");
        assert_eq!(decode_ascii_hex(b"48 65 6C 6C 6F>").unwrap(), b"Hello");
        // Odd number of digits
        assert_eq!(decode_ascii_hex(b"48656C6C6>").unwrap(), b"Hell`");
        assert_eq!(decode_ascii_hex(b"48656C6C6F").unwrap(), b"Hello");
        assert!(decode_ascii_hex(b">").unwrap().is_empty());
    }

    #[test]
    fn test_ascii_hex_failure_keeps_partial_output() {
        let failure = decode_ascii_hex(b"4865GG").unwrap_err();
        assert_eq!(failure.partial_output, b"He");
        assert_eq!(failure.bytes_processed, 4);
    }

    #[test]
    fn test_ascii85_decode() {
        assert_eq!(decode_ascii85(b"87cURD]j7BEbo80~>").unwrap(), b"Hello world!");
        assert_eq!(decode_ascii85(b"<~87cURD]j7BEbo80~>").unwrap(), b"Hello world!");
        assert_eq!(decode_ascii85(b"z~>").unwrap(), &[0, 0, 0, 0]);
        assert!(decode_ascii85(b"~>").unwrap().is_empty());
        assert!(decode_ascii85(b"invalid~>").is_err());
        assert!(decode_ascii85(b"uuuuu~>").is_err());
    }

    #[test]
    fn test_run_length_decode() {
        assert_eq!(decode_run_length(b"\x02abc\xfeZ\x80").unwrap(), b"abcZZZ");
        let failure = decode_run_length(b"\x05ab").unwrap_err();
        assert_eq!(failure.partial_output, b"ab");
    }

    #[test]
    fn test_filter_from_name() {
        assert_eq!(Filter::from_name("FlateDecode"), Some(Filter::FlateDecode));
        assert_eq!(Filter::from_name("/flatedecode"), Some(Filter::FlateDecode));
        assert_eq!(Filter::from_name("Fl"), Some(Filter::FlateDecode));
        assert_eq!(Filter::from_name("AHx"), Some(Filter::ASCIIHexDecode));
        assert_eq!(Filter::from_name("A85"), Some(Filter::ASCII85Decode));
        assert_eq!(Filter::from_name("LZW"), Some(Filter::LZWDecode));
        assert_eq!(Filter::from_name("RL"), Some(Filter::RunLengthDecode));
        assert_eq!(Filter::from_name("CCF"), Some(Filter::CCITTFaxDecode));
        assert_eq!(Filter::from_name("DCT"), Some(Filter::DCTDecode));
        assert_eq!(Filter::from_name("JBIG2Decode"), Some(Filter::JBIG2Decode));
        assert_eq!(Filter::from_name("JPXDecode"), Some(Filter::JPXDecode));
        assert_eq!(Filter::from_name("Crypt"), Some(Filter::Crypt));
        assert_eq!(Filter::from_name("UnknownFilter"), None);
        assert_eq!(Filter::FlateDecode.to_string(), "/FlateDecode");
    }

    #[test]
    fn test_opaque_filters_pass_through() {
        let params = DecodeParams::default();
        for filter in [Filter::DCTDecode, Filter::JPXDecode, Filter::JBIG2Decode, Filter::CCITTFaxDecode] {
            assert!(filter.is_opaque());
            assert_eq!(filter.decode(b"\xff\xd8", &params).unwrap(), b"\xff\xd8");
        }
    }

    #[test]
    fn test_decode_params_from_dict() {
        let mut dict = PdfDictionary::new();
        dict.insert(
            "Predictor",
            PdfValue::synthetic(PdfObject::Number(PdfNumber("12".into()))),
        );
        dict.insert(
            "Columns",
            PdfValue::synthetic(PdfObject::Number(PdfNumber("4".into()))),
        );
        let params = DecodeParams::from_dict(&dict);
        assert_eq!(params.predictor, 12);
        assert_eq!(params.columns, 4);
        assert_eq!(params.colors, 1);
        assert_eq!(params.early_change, 1);
    }

    #[test]
    fn test_png_up_predictor() {
        let params = DecodeParams {
            predictor: 12,
            columns: 3,
            ..Default::default()
        };
        // two rows, the second uses the Up filter
        let encoded = vec![0, 1, 2, 3, 2, 1, 1, 1];
        assert_eq!(apply_predictor(encoded, &params, 8).unwrap(), vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn test_tiff_predictor() {
        let params = DecodeParams {
            predictor: 2,
            columns: 3,
            ..Default::default()
        };
        assert_eq!(
            apply_predictor(vec![1, 1, 1, 5, 1, 1], &params, 6).unwrap(),
            vec![1, 2, 3, 5, 6, 7]
        );
    }

    #[test]
    fn test_oversized_predictor_row_fails() {
        let params = DecodeParams {
            predictor: 12,
            columns: 4_000_000_000_000,
            ..Default::default()
        };
        let failure = apply_predictor(vec![0, 1, 2, 3], &params, 12).unwrap_err();
        assert_eq!(failure.partial_output, vec![0, 1, 2, 3]);
        assert_eq!(failure.bytes_processed, 12);
        assert!(failure.message.contains("exceeds 4 bytes"));

        let params = DecodeParams {
            predictor: 2,
            colors: i64::MAX,
            columns: 2,
            ..Default::default()
        };
        let failure = apply_predictor(vec![1, 1], &params, 2).unwrap_err();
        assert_eq!(failure.partial_output, vec![1, 1]);
    }

    #[test]
    fn test_predictor_ignores_missing_layout() {
        let params = DecodeParams {
            predictor: 12,
            columns: -3,
            ..Default::default()
        };
        assert_eq!(apply_predictor(vec![0, 1], &params, 2).unwrap(), vec![0, 1]);
        let params = DecodeParams {
            predictor: 12,
            ..Default::default()
        };
        assert!(apply_predictor(Vec::new(), &params, 0).unwrap().is_empty());
    }

    #[test]
    fn test_lzw_decode() {
        // "-----A---B" with EarlyChange 1 (ISO 32000-1 Section 7.4.4.2 example)
        let encoded = [0x80, 0x0B, 0x60, 0x50, 0x22, 0x0C, 0x0C, 0x85, 0x01];
        assert_eq!(decode_lzw(&encoded, 1).unwrap(), b"-----A---B");
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_flate_decode() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let original = b"Hello, compressed world!";
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(original).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(decode_flate(&compressed).unwrap(), original);
        let failure = decode_flate(&compressed[..compressed.len() / 2]).unwrap_err();
        assert!(failure.partial_output.len() < original.len());
    }
}
