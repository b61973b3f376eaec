use byteorder::{BigEndian, ByteOrder};
use serde_json::json;

use crate::diag::{LogLevel, event_with_fields, json_kv};
use crate::error::DecodeError;

use super::types::{
    Bundle, CompressionKind, DecodeOptions, DecodePolicy, ElementRecord, ElementTag, FORMAT_VERSION,
    HEADER_LEN, MAGIC, NO_NAME, PropertyRecord, PropertyTag, PropertyValue, payload_checksum,
};

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::Truncated(what));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self, what: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, what)?[0])
    }

    fn read_u16(&mut self, what: &'static str) -> Result<u16, DecodeError> {
        Ok(BigEndian::read_u16(self.take(2, what)?))
    }

    fn read_u32(&mut self, what: &'static str) -> Result<u32, DecodeError> {
        Ok(BigEndian::read_u32(self.take(4, what)?))
    }

    fn read_i64(&mut self, what: &'static str) -> Result<i64, DecodeError> {
        Ok(BigEndian::read_i64(self.take(8, what)?))
    }

    fn read_f32(&mut self, what: &'static str) -> Result<f32, DecodeError> {
        Ok(BigEndian::read_f32(self.take(4, what)?))
    }

    fn read_f64(&mut self, what: &'static str) -> Result<f64, DecodeError> {
        Ok(BigEndian::read_f64(self.take(8, what)?))
    }
}

struct Header {
    version: (u16, u16, u16),
    flags: u16,
    element_count: u32,
    property_count: u32,
    string_table_size: u32,
    element_data_size: u32,
    checksum: u32,
}

/// Decode a binary bundle. Validation order: magic, version, declared
/// limits, compression support, checksum, then records.
pub fn decode(data: &[u8], options: &DecodeOptions) -> Result<Bundle, DecodeError> {
    let mut cursor = Cursor::new(data);
    let header = read_header(&mut cursor, options)?;

    let payload = &data[HEADER_LEN..];
    let declared_payload = header.string_table_size as usize + header.element_data_size as usize;
    if payload.len() < declared_payload {
        return Err(DecodeError::Truncated("payload"));
    }
    if payload.len() > declared_payload {
        return Err(DecodeError::CountMismatch {
            what: "payload bytes",
            declared: declared_payload as u32,
            found: payload.len() as u32,
        });
    }

    let computed = payload_checksum(payload);
    if computed != header.checksum {
        return Err(DecodeError::ChecksumMismatch {
            stored: header.checksum,
            computed,
        });
    }

    let mut bundle = Bundle::new();
    bundle.version = header.version;
    bundle.flags = header.flags;
    let mut strings = Cursor::new(&payload[..header.string_table_size as usize]);
    read_string_table(&mut strings, options, &mut bundle)?;
    if strings.remaining() != 0 {
        return Err(DecodeError::CountMismatch {
            what: "string table bytes",
            declared: header.string_table_size,
            found: (header.string_table_size as usize - strings.remaining()) as u32,
        });
    }

    let mut elements = Cursor::new(&payload[header.string_table_size as usize..]);
    read_elements(&mut elements, &header, options, &mut bundle)?;
    if elements.remaining() != 0 {
        return Err(DecodeError::CountMismatch {
            what: "element bytes",
            declared: header.element_data_size,
            found: (header.element_data_size as usize - elements.remaining()) as u32,
        });
    }

    bundle.validate()?;
    Ok(bundle)
}

fn read_header(cursor: &mut Cursor<'_>, options: &DecodeOptions) -> Result<Header, DecodeError> {
    let magic = cursor.read_u32("header")?;
    if magic != MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }

    let major = cursor.read_u16("header")?;
    let minor = cursor.read_u16("header")?;
    let patch = cursor.read_u16("header")?;
    if major != FORMAT_VERSION.0 {
        return Err(DecodeError::UnsupportedVersion {
            major,
            supported: FORMAT_VERSION.0,
        });
    }
    let flags = cursor.read_u16("header")?;

    let element_count = cursor.read_u32("header")?;
    let property_count = cursor.read_u32("header")?;
    let string_table_size = cursor.read_u32("header")?;
    let element_data_size = cursor.read_u32("header")?;
    let checksum = cursor.read_u32("header")?;
    let compression = cursor.read_u8("header")?;
    let _uncompressed_size = cursor.read_u32("header")?;
    cursor.take(HEADER_LEN - cursor.pos, "header")?;

    if element_count > options.max_elements {
        return Err(DecodeError::LimitExceeded {
            what: "element",
            declared: element_count as u64,
            limit: options.max_elements as u64,
        });
    }
    if property_count > options.max_properties {
        return Err(DecodeError::LimitExceeded {
            what: "property",
            declared: property_count as u64,
            limit: options.max_properties as u64,
        });
    }
    if string_table_size > options.max_string_bytes {
        return Err(DecodeError::LimitExceeded {
            what: "string table byte",
            declared: string_table_size as u64,
            limit: options.max_string_bytes as u64,
        });
    }

    match CompressionKind::from_wire(compression)? {
        CompressionKind::None => {}
        other => return Err(DecodeError::UnsupportedCompression(other.name())),
    }

    Ok(Header {
        version: (major, minor, patch),
        flags,
        element_count,
        property_count,
        string_table_size,
        element_data_size,
        checksum,
    })
}

fn read_string_table(
    cursor: &mut Cursor<'_>,
    options: &DecodeOptions,
    bundle: &mut Bundle,
) -> Result<(), DecodeError> {
    if cursor.remaining() == 0 {
        return Ok(());
    }
    let count = cursor.read_u32("string count")?;
    if count > options.max_string_entries {
        return Err(DecodeError::LimitExceeded {
            what: "string entry",
            declared: count as u64,
            limit: options.max_string_entries as u64,
        });
    }

    bundle.strings.reserve(count as usize);
    for i in 0..count {
        let len = cursor.read_u16("string length")? as usize;
        let bytes = cursor.take(len, "string data")?;
        let value = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(i as usize))?;
        bundle.strings.push(value.to_string());
    }
    Ok(())
}

fn read_elements(
    cursor: &mut Cursor<'_>,
    header: &Header,
    options: &DecodeOptions,
    bundle: &mut Bundle,
) -> Result<(), DecodeError> {
    let mut properties_seen: u32 = 0;

    for index in 0..header.element_count {
        if cursor.remaining() == 0 {
            return Err(DecodeError::CountMismatch {
                what: "elements",
                declared: header.element_count,
                found: index,
            });
        }
        let element = read_element(cursor, options, bundle, &mut properties_seen)?;
        bundle.elements.push(element);
    }

    if properties_seen != header.property_count {
        return Err(DecodeError::CountMismatch {
            what: "properties",
            declared: header.property_count,
            found: properties_seen,
        });
    }
    Ok(())
}

fn read_element(
    cursor: &mut Cursor<'_>,
    options: &DecodeOptions,
    bundle: &Bundle,
    properties_seen: &mut u32,
) -> Result<ElementRecord, DecodeError> {
    let id = cursor.read_u32("element record")?;
    let raw_tag = cursor.read_u16("element record")?;
    let name_index = cursor.read_u16("element record")?;
    let parent_id = cursor.read_u32("element record")?;
    let property_count = cursor.read_u16("element record")?;
    let child_count = cursor.read_u16("element record")?;

    let tag = match ElementTag::from_wire(raw_tag) {
        Some(tag) => tag,
        None => match options.policy {
            DecodePolicy::Strict => return Err(DecodeError::UnknownElementTag(raw_tag)),
            DecodePolicy::Permissive => {
                warn(
                    options,
                    "unknown_element_tag",
                    [json_kv("tag", json!(raw_tag)), json_kv("element", json!(id))],
                );
                ElementTag::Custom(raw_tag)
            }
        },
    };

    let name = if name_index == NO_NAME {
        None
    } else {
        check_string_index(name_index, bundle)?;
        Some(name_index)
    };

    let mut properties = Vec::with_capacity(property_count as usize);
    for _ in 0..property_count {
        *properties_seen += 1;
        if let Some(property) = read_property(cursor, options, bundle, id)? {
            properties.push(property);
        }
    }

    let mut children = Vec::with_capacity(child_count as usize);
    for _ in 0..child_count {
        children.push(cursor.read_u32("child id")?);
    }

    Ok(ElementRecord {
        id,
        tag,
        name,
        parent_id,
        properties,
        children,
    })
}

fn read_property(
    cursor: &mut Cursor<'_>,
    options: &DecodeOptions,
    bundle: &Bundle,
    element_id: u32,
) -> Result<Option<PropertyRecord>, DecodeError> {
    let name = cursor.read_u16("property record")?;
    let raw_tag = cursor.read_u8("property record")?;
    let value_len = cursor.read_u16("property record")?;

    let tag = match PropertyTag::from_wire(raw_tag) {
        Some(tag) => tag,
        None => match options.policy {
            DecodePolicy::Strict => return Err(DecodeError::UnknownPropertyTag(raw_tag)),
            DecodePolicy::Permissive => {
                // The wire carries the value length so unknown payloads can
                // be stepped over without guessing their size.
                cursor.take(value_len as usize, "property value")?;
                warn(
                    options,
                    "unknown_property_tag",
                    [
                        json_kv("tag", json!(raw_tag)),
                        json_kv("element", json!(element_id)),
                    ],
                );
                return Ok(None);
            }
        },
    };

    check_string_index(name, bundle)?;
    if value_len != tag.value_len() {
        return Err(DecodeError::ValueSizeMismatch {
            tag: raw_tag,
            expected: tag.value_len(),
            got: value_len,
        });
    }

    let value = match tag {
        PropertyTag::String => {
            let index = cursor.read_u16("property value")?;
            check_string_index(index, bundle)?;
            PropertyValue::Str(index)
        }
        PropertyTag::Int => PropertyValue::Int(cursor.read_i64("property value")?),
        PropertyTag::Float => PropertyValue::Float(cursor.read_f64("property value")?),
        PropertyTag::Bool => PropertyValue::Bool(cursor.read_u8("property value")? != 0),
        PropertyTag::Color => PropertyValue::Color(cursor.read_u32("property value")?),
        PropertyTag::Size => PropertyValue::Size {
            width: cursor.read_f32("property value")?,
            height: cursor.read_f32("property value")?,
        },
        PropertyTag::Position => PropertyValue::Position {
            x: cursor.read_f32("property value")?,
            y: cursor.read_f32("property value")?,
        },
        PropertyTag::Margin => PropertyValue::Margin(read_edges(cursor)?),
        PropertyTag::Padding => PropertyValue::Padding(read_edges(cursor)?),
        PropertyTag::Reference => PropertyValue::Reference(cursor.read_u32("property value")?),
        PropertyTag::Expression => {
            let index = cursor.read_u16("property value")?;
            check_string_index(index, bundle)?;
            PropertyValue::Expression(index)
        }
        PropertyTag::Function => {
            let index = cursor.read_u16("property value")?;
            check_string_index(index, bundle)?;
            PropertyValue::Function(index)
        }
    };

    Ok(Some(PropertyRecord { name, value }))
}

fn read_edges(cursor: &mut Cursor<'_>) -> Result<[f32; 4], DecodeError> {
    Ok([
        cursor.read_f32("property value")?,
        cursor.read_f32("property value")?,
        cursor.read_f32("property value")?,
        cursor.read_f32("property value")?,
    ])
}

fn check_string_index(index: u16, bundle: &Bundle) -> Result<(), DecodeError> {
    if (index as usize) < bundle.strings.len() {
        Ok(())
    } else {
        Err(DecodeError::StringIndexOutOfRange {
            index,
            len: bundle.strings.len(),
        })
    }
}

fn warn(
    options: &DecodeOptions,
    message: &str,
    fields: impl IntoIterator<Item = (String, serde_json::Value)>,
) {
    if let Some(logger) = options.logger.as_ref() {
        let event = event_with_fields(LogLevel::Warn, "trellis::bundle", message, fields);
        let _ = logger.log_event(event);
    }
}
