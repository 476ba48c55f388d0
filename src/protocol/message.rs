//! Module `message`
//!
//! A parsed CoT protocol unit. Classification happens once at parse time so
//! routing is a plain match over [`MessageKind`].

use crate::error::ParseError;
use crate::protocol::xml::XmlElement;

/// `type` attribute of a heartbeat request.
pub const PING_TYPE: &str = "t-x-c-t";

/// Detail children that together mark an identity announcement.
const IDENTITY_MARKERS: [&str; 3] = ["__group", "contact", "takv"];

/// Username, password and uid carried by an `<auth>` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub uid: String,
}

/// Identity fields bound to a connection by an announcement event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Announcement {
    pub uid: Option<String>,
    pub callsign: Option<String>,
    pub group: Option<String>,
}

/// Routing facts derived from an `<event>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    pub uid: Option<String>,
    pub event_type: Option<String>,
    pub is_ping: bool,
    pub announcement: Option<Announcement>,
    /// Marti destination uids in document order, duplicates kept.
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Auth(Credentials),
    Event(EventInfo),
}

/// Immutable, classified protocol message.
#[derive(Debug, Clone)]
pub struct Message {
    raw: String,
    root: XmlElement,
    kind: MessageKind,
}

impl Message {
    /// Parses one framed message. Unknown root tags are reported separately
    /// from malformed XML because they are fatal to the connection.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let raw = text.trim();
        if raw.is_empty() {
            return Err(ParseError::Empty);
        }

        let root = XmlElement::parse(raw)?;
        let kind = match root.name.as_str() {
            "auth" => MessageKind::Auth(Self::credentials(&root)),
            "event" => MessageKind::Event(Self::event_info(&root)),
            other => return Err(ParseError::UnknownMessageType(other.to_string())),
        };

        Ok(Self {
            raw: raw.to_string(),
            root,
            kind,
        })
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Root tag name, `event` or `auth`.
    pub fn name(&self) -> &str {
        &self.root.name
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.root.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.root.attr(key)
    }

    pub fn is_ping(&self) -> bool {
        matches!(&self.kind, MessageKind::Event(event) if event.is_ping)
    }

    pub fn is_identity_announcement(&self) -> bool {
        matches!(&self.kind, MessageKind::Event(event) if event.announcement.is_some())
    }

    pub fn has_targeted_destinations(&self) -> bool {
        !self.target_uids().is_empty()
    }

    pub fn target_uids(&self) -> &[String] {
        match &self.kind {
            MessageKind::Event(event) => &event.targets,
            MessageKind::Auth(_) => &[],
        }
    }

    /// Serialized form forwarded to other clients.
    pub fn to_xml(&self) -> &str {
        &self.raw
    }

    fn credentials(root: &XmlElement) -> Credentials {
        let block = root.child("cot").or_else(|| root.children.first());
        let field = |key: &str| {
            block
                .and_then(|element| element.attr(key))
                .unwrap_or_default()
                .to_string()
        };

        Credentials {
            username: field("username"),
            password: field("password"),
            uid: field("uid"),
        }
    }

    fn event_info(root: &XmlElement) -> EventInfo {
        let event_type = root.attr("type").map(str::to_string);
        let detail = root.child("detail");

        let announcement = detail
            .filter(|detail| {
                IDENTITY_MARKERS
                    .iter()
                    .all(|marker| detail.child(marker).is_some())
            })
            .map(|detail| Announcement {
                uid: root.attr("uid").map(str::to_string),
                callsign: detail
                    .child("contact")
                    .and_then(|contact| contact.attr("callsign"))
                    .map(str::to_string),
                group: detail
                    .child("__group")
                    .and_then(|group| group.attr("name"))
                    .map(str::to_string),
            });

        let targets = detail
            .and_then(|detail| detail.child("marti"))
            .map(|marti| {
                marti
                    .children_named("dest")
                    .filter_map(|dest| dest.attr("uid"))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        EventInfo {
            uid: root.attr("uid").map(str::to_string),
            is_ping: event_type.as_deref() == Some(PING_TYPE),
            event_type,
            announcement,
            targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSITION: &str = r#"<event version="2.0" uid="FBE5C615-2EC8-427D-8178-E2DD9716E361" type="a-f-G-E-V-C" how="h-e" time="2023-01-24T09:17:49Z" start="2023-01-24T09:17:49Z" stale="2023-01-24T09:19:49Z">
  <point lat="40.41592833093477" lon="0.42432347628362926" hae="0.0" ce="9999999.0" le="9999999.0"/>
  <detail>
    <contact callsign="Papa Uniform" phone="+34123456789" endpoint="*:-1:stcp"/>
    <__group name="Cyan" role="Team Member"/>
    <precisionlocation geopointsrc="User" altsrc="???"/>
    <status battery="100"/>
    <takv device="iPad" platform="iTAK" os="16.2" version="2.4.1.602"/>
    <track speed="-1.0" course="0.0"/>
  </detail>
</event>"#;

    const PING: &str = r#"<event version="2.0" uid="TEST-ping" type="t-x-c-t" time="2023-02-09T05:34:07.851Z" start="2023-02-09T05:34:07.851Z" stale="2023-02-09T05:34:17.851Z" how="m-g">
  <point lat="0.00000000" lon="0.00000000" hae="0.00000000" ce="9999999" le="9999999"/>
  <detail/>
</event>"#;

    const CHAT: &str = r#"<event version="2.0" uid="SENDER-UID" type="b-t-f" how="h-g-i-g-o" time="2023-01-24T09:17:49Z" start="2023-01-24T09:17:49Z" stale="2023-01-24T09:19:49Z">
  <point lat="0.0" lon="0.0" hae="0.0" ce="9999999.0" le="9999999.0"/>
  <detail>
    <link uid="DEST-A" relation="p-p" type="a-f-G-E-V-C"/>
    <remarks>Test message</remarks>
    <marti>
      <dest callsign="A" uid="DEST-A"/>
      <dest callsign="nobody"/>
      <dest callsign="B" uid="DEST-B"/>
      <dest callsign="A again" uid="DEST-A"/>
    </marti>
  </detail>
</event>"#;

    #[test]
    fn exposes_event_attributes_in_order() {
        let message = Message::parse(POSITION).unwrap();
        let keys: Vec<_> = message.attributes().iter().map(|(k, _)| k.as_str()).collect();

        assert_eq!(message.name(), "event");
        assert_eq!(keys, ["version", "uid", "type", "how", "time", "start", "stale"]);
        assert_eq!(message.attribute("type"), Some("a-f-G-E-V-C"));
        assert_eq!(message.to_xml(), POSITION);
    }

    #[test]
    fn identity_announcement_needs_all_three_markers() {
        let message = Message::parse(POSITION).unwrap();
        assert!(message.is_identity_announcement());
        match message.kind() {
            MessageKind::Event(event) => {
                let announcement = event.announcement.as_ref().unwrap();
                assert_eq!(announcement.callsign.as_deref(), Some("Papa Uniform"));
                assert_eq!(announcement.group.as_deref(), Some("Cyan"));
                assert_eq!(
                    announcement.uid.as_deref(),
                    Some("FBE5C615-2EC8-427D-8178-E2DD9716E361")
                );
            }
            other => panic!("expected event, got {other:?}"),
        }

        let without_takv = POSITION.replace(
            r#"<takv device="iPad" platform="iTAK" os="16.2" version="2.4.1.602"/>"#,
            "",
        );
        assert!(!Message::parse(&without_takv).unwrap().is_identity_announcement());
    }

    #[test]
    fn ping_is_classified_by_type() {
        let ping = Message::parse(PING).unwrap();
        assert!(ping.is_ping());
        assert!(!ping.is_identity_announcement());
        assert!(!ping.has_targeted_destinations());

        assert!(!Message::parse(POSITION).unwrap().is_ping());
    }

    #[test]
    fn marti_destinations_keep_order_and_duplicates() {
        let message = Message::parse(CHAT).unwrap();
        assert!(message.has_targeted_destinations());
        assert_eq!(message.target_uids(), ["DEST-A", "DEST-B", "DEST-A"]);
    }

    #[test]
    fn marti_without_uids_is_not_targeted() {
        let message = Message::parse(
            r#"<event uid="X" type="b-t-f"><detail><marti><dest callsign="nobody"/></marti></detail></event>"#,
        )
        .unwrap();
        assert!(!message.has_targeted_destinations());
    }

    #[test]
    fn auth_credentials_are_extracted() {
        let message = Message::parse(
            r#"<auth><cot username="piotr" password="password" uid="TEST-UID-123"/></auth>"#,
        )
        .unwrap();

        assert_eq!(
            message.kind(),
            &MessageKind::Auth(Credentials {
                username: "piotr".into(),
                password: "password".into(),
                uid: "TEST-UID-123".into(),
            })
        );
        assert!(message.target_uids().is_empty());
    }

    #[test]
    fn auth_without_block_has_empty_credentials() {
        let message = Message::parse("<auth></auth>").unwrap();
        match message.kind() {
            MessageKind::Auth(credentials) => assert!(credentials.username.is_empty()),
            other => panic!("expected auth, got {other:?}"),
        }
    }

    #[test]
    fn declaration_and_whitespace_are_tolerated() {
        let text = format!("\n<?xml version=\"1.0\" standalone=\"yes\"?>\n{PING}\n");
        assert!(Message::parse(&text).unwrap().is_ping());
    }

    #[test]
    fn unknown_root_is_reported() {
        assert!(matches!(
            Message::parse("<unknown><data/></unknown>"),
            Err(ParseError::UnknownMessageType(tag)) if tag == "unknown"
        ));
    }

    #[test]
    fn malformed_xml_is_reported() {
        assert!(matches!(
            Message::parse(r#"<event uid="x><detail></event>"#),
            Err(ParseError::Malformed(_))
        ));
    }
}
