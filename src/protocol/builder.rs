//! Message construction
//!
//! Builds well-formed CoT documents, most notably the heartbeat reply sent
//! back to a pinging client.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};

use crate::error::BuildError;

/// `type` attribute of a heartbeat reply.
pub const PONG_TYPE: &str = "t-x-c-t-r";
pub const PONG_UID: &str = "takPong";
const PONG_HOW: &str = "h-g-i-g-o";
pub const PONG_VALIDITY_SECS: i64 = 20;

const COT_VERSION: &str = "2.0";
const UNKNOWN_ERROR: f64 = 9_999_999.0;

/// Attribute value; timestamps render as UTC ISO-8601 with milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Time(DateTime<Utc>),
}

impl AttrValue {
    fn render(&self) -> String {
        match self {
            AttrValue::Text(text) => text.clone(),
            AttrValue::Time(time) => time.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<DateTime<Utc>> for AttrValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttrValue::Time(value)
    }
}

/// `<point>` block. The default is the "position unknown" point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
    pub hae: f64,
    pub ce: f64,
    pub le: f64,
}

impl Default for Point {
    fn default() -> Self {
        Self {
            lat: 0.0,
            lon: 0.0,
            hae: 0.0,
            ce: UNKNOWN_ERROR,
            le: UNKNOWN_ERROR,
        }
    }
}

/// One child element of `<detail>`.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailEntry {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct MessageBuilder {
    tag: String,
    version: String,
    attributes: Vec<(String, AttrValue)>,
    point: Option<Point>,
    detail: Option<Vec<DetailEntry>>,
}

impl MessageBuilder {
    /// Starts a `tag` element with version 2.0 and a default point.
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            version: COT_VERSION.to_string(),
            attributes: Vec::new(),
            point: Some(Point::default()),
            detail: None,
        }
    }

    pub fn event() -> Self {
        Self::new("event")
    }

    /// Heartbeat reply stamped at `now`, stale after the validity window.
    pub fn pong(now: DateTime<Utc>) -> Self {
        Self::event()
            .attribute("uid", PONG_UID)
            .attribute("type", PONG_TYPE)
            .attribute("how", PONG_HOW)
            .attribute("time", now)
            .attribute("start", now)
            .attribute("stale", now + TimeDelta::seconds(PONG_VALIDITY_SECS))
            .empty_detail()
    }

    pub fn attribute(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        let value = value.into();
        if key == "version" {
            self.version = value.render();
        } else {
            self.attributes.push((key.to_string(), value));
        }
        self
    }

    pub fn point(mut self, point: Point) -> Self {
        self.point = Some(point);
        self
    }

    pub fn without_point(mut self) -> Self {
        self.point = None;
        self
    }

    pub fn detail_entry(mut self, name: &str, attributes: &[(&str, &str)]) -> Self {
        let entry = DetailEntry {
            name: name.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.detail.get_or_insert_with(Vec::new).push(entry);
        self
    }

    /// Emits `<detail/>` even with no entries.
    pub fn empty_detail(mut self) -> Self {
        self.detail.get_or_insert_with(Vec::new);
        self
    }

    pub fn to_xml(&self) -> Result<String, BuildError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

        let mut root = BytesStart::new(self.tag.as_str());
        root.push_attribute(("version", self.version.as_str()));
        for (key, value) in &self.attributes {
            let value = value.render();
            root.push_attribute((key.as_str(), value.as_str()));
        }
        writer.write_event(Event::Start(root))?;

        if let Some(point) = &self.point {
            let values = [
                ("lat", point.lat),
                ("lon", point.lon),
                ("hae", point.hae),
                ("ce", point.ce),
                ("le", point.le),
            ];
            let mut element = BytesStart::new("point");
            for (key, value) in values {
                element.push_attribute((key, value.to_string().as_str()));
            }
            writer.write_event(Event::Empty(element))?;
        }

        match &self.detail {
            Some(entries) if entries.is_empty() => {
                writer.write_event(Event::Empty(BytesStart::new("detail")))?;
            }
            Some(entries) => {
                writer.write_event(Event::Start(BytesStart::new("detail")))?;
                for entry in entries {
                    let mut element = BytesStart::new(entry.name.as_str());
                    for (key, value) in &entry.attributes {
                        element.push_attribute((key.as_str(), value.as_str()));
                    }
                    writer.write_event(Event::Empty(element))?;
                }
                writer.write_event(Event::End(BytesEnd::new("detail")))?;
            }
            None => {}
        }

        writer.write_event(Event::End(BytesEnd::new(self.tag.as_str())))?;
        Ok(String::from_utf8(writer.into_inner())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::Message;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 10, 2, 5, 33, 17).unwrap() + TimeDelta::milliseconds(731)
    }

    #[test]
    fn pong_has_fixed_shape() {
        let xml = MessageBuilder::pong(fixed_now()).to_xml().unwrap();
        let message = Message::parse(&xml).unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#));
        assert_eq!(message.name(), "event");
        assert_eq!(message.attribute("version"), Some("2.0"));
        assert_eq!(message.attribute("uid"), Some(PONG_UID));
        assert_eq!(message.attribute("type"), Some(PONG_TYPE));
        assert_eq!(message.attribute("time"), Some("2023-10-02T05:33:17.731Z"));
        assert_eq!(message.attribute("start"), Some("2023-10-02T05:33:17.731Z"));
        assert_eq!(message.attribute("stale"), Some("2023-10-02T05:33:37.731Z"));
        assert!(xml.contains(r#"<point lat="0" lon="0" hae="0" ce="9999999" le="9999999"/>"#));
        assert!(xml.contains("<detail/>"));
        assert!(!message.is_ping());
    }

    #[test]
    fn detail_entries_are_written_in_order() {
        let xml = MessageBuilder::event()
            .attribute("uid", "ANDROID-1")
            .point(Point {
                lat: 40.5,
                lon: -3.25,
                ..Point::default()
            })
            .detail_entry("contact", &[("callsign", "Alpha")])
            .detail_entry("__group", &[("name", "Cyan"), ("role", "Team Member")])
            .to_xml()
            .unwrap();

        assert!(xml.contains(r#"lat="40.5" lon="-3.25""#));
        let contact = xml.find("<contact").unwrap();
        let group = xml.find("<__group").unwrap();
        assert!(contact < group);
        assert!(xml.trim_end().ends_with("</event>"));
    }

    #[test]
    fn detail_and_point_are_optional() {
        let xml = MessageBuilder::new("event")
            .attribute("uid", "X")
            .without_point()
            .to_xml()
            .unwrap();
        assert!(!xml.contains("<point"));
        assert!(!xml.contains("<detail"));
    }

    #[test]
    fn attribute_values_are_escaped() {
        let xml = MessageBuilder::event()
            .attribute("uid", r#"a"<b>&c"#)
            .to_xml()
            .unwrap();
        let message = Message::parse(&xml).unwrap();
        assert_eq!(message.attribute("uid"), Some(r#"a"<b>&c"#));
    }

    #[test]
    fn numeric_attributes_render_plainly() {
        let xml = MessageBuilder::event()
            .attribute("uid", "X")
            .attribute("access", 3i64)
            .attribute("accuracy", 12.5)
            .to_xml()
            .unwrap();
        let message = Message::parse(&xml).unwrap();

        assert_eq!(message.attribute("access"), Some("3"));
        assert_eq!(message.attribute("accuracy"), Some("12.5"));
    }

    #[test]
    fn version_attribute_overrides_default() {
        let xml = MessageBuilder::event().attribute("version", "1.1").to_xml().unwrap();
        assert_eq!(xml.matches("version=").count(), 2); // declaration + root
        assert!(xml.contains(r#"<event version="1.1""#));
    }
}
