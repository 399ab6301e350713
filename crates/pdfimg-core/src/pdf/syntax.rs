//! Rendering of lopdf objects back into PDF syntax.

use lopdf::{Object, StringFormat};

/// Render an object the way it appears in the file. Streams render as their dictionary only.
pub fn render_object(object: &Object) -> String {
    let mut out = String::new();
    write_object(object, &mut out);
    out
}

fn write_object(object: &Object, out: &mut String) {
    match object {
        Object::Null => out.push_str("null"),
        Object::Boolean(value) => out.push_str(if *value { "true" } else { "false" }),
        Object::Integer(value) => out.push_str(&value.to_string()),
        Object::Real(value) => out.push_str(&value.to_string()),
        Object::Name(name) => {
            out.push('/');
            out.push_str(&String::from_utf8_lossy(name));
        }
        Object::String(bytes, StringFormat::Hexadecimal) => {
            out.push('<');
            for byte in bytes {
                out.push_str(&format!("{byte:02X}"));
            }
            out.push('>');
        }
        Object::String(bytes, _) => {
            out.push('(');
            for &byte in bytes {
                match byte {
                    b'(' | b')' | b'\\' => {
                        out.push('\\');
                        out.push(byte as char);
                    }
                    0x20..=0x7E => out.push(byte as char),
                    _ => out.push_str(&format!("\\{byte:03o}")),
                }
            }
            out.push(')');
        }
        Object::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_object(item, out);
            }
            out.push(']');
        }
        Object::Dictionary(dict) => write_dictionary(dict, out),
        Object::Stream(stream) => write_dictionary(&stream.dict, out),
        Object::Reference((id, generation)) => out.push_str(&format!("{id} {generation} R")),
    }
}

fn write_dictionary(dict: &lopdf::Dictionary, out: &mut String) {
    out.push_str("<<");
    for (key, value) in dict.iter() {
        out.push_str(" /");
        out.push_str(&String::from_utf8_lossy(key));
        out.push(' ');
        write_object(value, out);
    }
    out.push_str(" >>");
}
