use chrono::TimeZone;
use serde_json::json;

use super::*;

fn addr(s: &str) -> EmailAddress { EmailAddress::parse(s).unwrap() }

#[test]
fn address_parse_splits_and_lowercases_domain() {
    let a = addr(" Bob.Smith@XMail.com ");
    assert_eq!(a.local_part(), "Bob.Smith");
    assert_eq!(a.domain(), "xmail.com");
    assert_eq!(a.to_string(), "Bob.Smith@xmail.com");
    assert_eq!(EmailAddress::new("bob", "xmail.com").unwrap(), addr("bob@xmail.com"));
}

#[test]
fn address_parse_rejects_malformed() {
    for bad in ["", "bob", "@xmail.com", "bob@", "bob@localhost", "bo b@xmail.com", ".bob@xmail.com", "bo..b@xmail.com", "bob@-x.com"] {
        assert!(matches!(EmailAddress::parse(bad), Err(ValidationReason::InvalidAddress(_))), "{bad:?}");
    }
}

#[test]
fn header_requires_unique_nonempty_recipients() {
    let sender = addr("alice@xmail.com");
    assert_eq!(EmailHeader::builder(sender.clone()).build().unwrap_err(), ValidationReason::EmptyRecipients);
    let dup = EmailHeader::builder(sender.clone()).to(addr("bob@xmail.com")).to(addr("bob@XMAIL.com")).build();
    assert!(matches!(dup, Err(ValidationReason::DuplicateRecipient(_))));
    let dup_cc = EmailHeader::builder(sender).to(addr("bob@xmail.com")).cc(addr("c@xmail.com")).cc(addr("c@xmail.com")).build();
    assert!(matches!(dup_cc, Err(ValidationReason::DuplicateRecipient(_))));
}

#[test]
fn header_defaults_follow_sender() {
    let h = EmailHeader::builder(addr("alice@xmail.com")).to(addr("bob@xmail.com")).subject("  hi  ").build().unwrap();
    assert_eq!(h.reply_to(), h.sender());
    assert_eq!(h.return_path(), h.sender());
    assert_eq!(h.subject(), "hi");
    assert!(Utc::now() - h.date() < Duration::minutes(1));
    assert_eq!(h.recipients().count(), 1);
}

#[test]
fn header_serialises_with_header_names() {
    let date = Utc.with_ymd_and_hms(2024, 8, 12, 13, 23, 0).unwrap();
    let h = EmailHeader::builder(addr("alice@xmail.com"))
        .to(addr("bob@xmail.com"))
        .cc(addr("carol@xmail.com"))
        .subject("lunch")
        .date(date)
        .build()
        .unwrap();
    let v = serde_json::to_value(&h).unwrap();
    assert_eq!(v["To"], json!(["bob@xmail.com"]));
    assert_eq!(v["CC"], json!(["carol@xmail.com"]));
    assert_eq!(v["From"], json!("alice@xmail.com"));
    assert_eq!(v["Reply-To"], json!("alice@xmail.com"));
    assert_eq!(v["Subject"], json!("lunch"));
    let back: EmailHeader = serde_json::from_value(v).unwrap();
    assert_eq!(back, h);
}

#[test]
fn invalid_stored_address_fails_to_decode() {
    let v = json!({"To": ["nope"], "From": "a@xmail.com", "Reply-To": "a@xmail.com", "Return-Path": "a@xmail.com", "Date": "2024-08-12T13:23:00Z"});
    assert!(serde_json::from_value::<EmailHeader>(v).is_err());
}

fn stored(to: &[&str], cc: &[&str], subject: &str) -> serde_json::Value {
    json!({"To": to, "CC": cc, "From": "a@xmail.com", "Subject": subject, "Date": "2024-08-12T13:23:00Z"})
}

#[test]
fn stored_headers_are_checked_like_built_ones() {
    let empty = serde_json::from_value::<EmailHeader>(stored(&[], &[], "x")).unwrap_err();
    assert!(empty.to_string().contains("recipient"), "{empty}");
    let dup = serde_json::from_value::<EmailHeader>(stored(&["bob@xmail.com"], &["c@xmail.com", "c@XMAIL.com"], "x"));
    assert!(dup.is_err());
}

#[test]
fn stored_header_fills_defaults_through_the_builder() {
    let h: EmailHeader = serde_json::from_value(stored(&["bob@xmail.com"], &[], "  padded  ")).unwrap();
    assert_eq!(h.subject(), "padded");
    assert_eq!(h.reply_to(), h.sender());
    assert_eq!(h.return_path(), h.sender());
    assert!(h.cc().is_empty() && h.bcc().is_empty());
}

#[test]
fn date_rendering_depends_on_age() {
    let date = Utc.with_ymd_and_hms(2024, 8, 13, 13, 23, 0).unwrap();
    let h = EmailHeader::builder(addr("alice@xmail.com")).to(addr("bob@xmail.com")).date(date).build().unwrap();
    let soon = date + Duration::days(2);
    let later = date + Duration::days(30);
    assert_eq!(h.short_date_at(soon), "Tue 01:23 PM");
    assert_eq!(h.full_date_at(soon), "Tue 01:23 PM");
    assert_eq!(h.short_date_at(later), "Aug 13");
    assert_eq!(h.full_date_at(later), "Tue Aug 13 – 01:23 PM");
}

#[test]
fn uid_is_not_part_of_the_document() {
    let h = EmailHeader::builder(addr("alice@xmail.com")).to(addr("bob@xmail.com")).build().unwrap();
    let mut e = Email::new(h, Some("body".into()));
    e.uid = Some(Uid::from("abc"));
    let v = serde_json::to_value(&e).unwrap();
    assert!(v.get("uid").is_none());
    assert_eq!(v["body"], json!("body"));
    let back: Email = serde_json::from_value(v).unwrap();
    assert_eq!(back.uid, None);
}
