//! Minimal SOAP request parsing.

use quick_xml::events::Event;
use quick_xml::Reader;

/// Extract the request action: the first element inside the SOAP Body.
pub fn extract_action(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut in_body = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"Body" {
                    in_body = true;
                } else if in_body {
                    return Some(String::from_utf8_lossy(name.as_ref()).into_owned());
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
    }
}

/// Text content of the first element with the given local name.
pub fn element_text(xml: &str, local: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut capture = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                capture = e.local_name().as_ref() == local.as_bytes();
            }
            Ok(Event::Text(e)) if capture => {
                return e.unescape().ok().map(|t| t.trim().to_string());
            }
            Ok(Event::End(_)) => capture = false,
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
    }
}
