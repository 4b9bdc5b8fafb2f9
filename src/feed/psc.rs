// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::feed::parse::ChapterData;
use crate::feed::time::parse_clock_duration;

/// Which child of the current item is being read as text
enum Capture {
    None,
    Guid,
    Link,
}

/// Extract Podlove Simple Chapters from raw feed XML, keyed by the
/// enclosing item's guid (falling back to its link).
///
/// The feed parser does not surface the psc namespace, so chapters get
/// a second, targeted pass over the bytes. Malformed XML ends the scan
/// early; whatever was collected up to that point is returned.
pub fn extract_chapters(bytes: &[u8]) -> HashMap<String, Vec<ChapterData>> {
    let mut reader = Reader::from_reader(bytes);
    let mut found = HashMap::new();

    let mut in_item = false;
    let mut guid = String::new();
    let mut link = String::new();
    let mut chapters: Vec<ChapterData> = Vec::new();
    let mut capture = Capture::None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => {
                    in_item = true;
                    guid.clear();
                    link.clear();
                    chapters.clear();
                }
                b"guid" | b"id" if in_item => capture = Capture::Guid,
                b"link" if in_item => match attribute(&e, b"href") {
                    Some(href) if link.is_empty() => link = href,
                    Some(_) => {}
                    None => capture = Capture::Link,
                },
                b"chapter" if in_item => {
                    if let Some(chapter) = parse_chapter(&e) {
                        chapters.push(chapter);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"link" if in_item => {
                    if link.is_empty() {
                        if let Some(href) = attribute(&e, b"href") {
                            link = href;
                        }
                    }
                }
                b"chapter" if in_item => {
                    if let Some(chapter) = parse_chapter(&e) {
                        chapters.push(chapter);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if in_item {
                    if let Ok(text) = t.unescape() {
                        match capture {
                            Capture::Guid => guid.push_str(text.trim()),
                            Capture::Link => link.push_str(text.trim()),
                            Capture::None => {}
                        }
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => {
                    in_item = false;
                    if !chapters.is_empty() {
                        let key = if guid.is_empty() { &link } else { &guid };
                        if !key.is_empty() {
                            found.insert(key.clone(), std::mem::take(&mut chapters));
                        }
                    }
                }
                b"guid" | b"id" | b"link" => capture = Capture::None,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => {}
        }
    }

    found
}

fn parse_chapter(e: &BytesStart) -> Option<ChapterData> {
    let start = parse_clock_duration(&attribute(e, b"start")?)?;
    Some(ChapterData {
        start,
        title: attribute(e, b"title").unwrap_or_default(),
        link: attribute(e, b"href").unwrap_or_default(),
        image: attribute(e, b"image").unwrap_or_default(),
    })
}

fn attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}
