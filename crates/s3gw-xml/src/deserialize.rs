//! Request body decoding.
//!
//! Only two S3 request bodies matter to the gateway: the part list of
//! CompleteMultipartUpload and the `AccessControlPolicy` of the ACL puts.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use s3gw_model::types::{AccessControlPolicy, CompletedPart, Grant, Grantee, Owner, Permission};

use crate::error::XmlError;

/// A type that parses itself from the children of its root element.
pub trait S3Deserialize: Sized {
    /// The expected root element name.
    const ROOT: &'static str;

    /// Read child content up to and including the matching end tag.
    ///
    /// # Errors
    ///
    /// Returns `XmlError` if the XML is malformed or required fields are missing.
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError>;
}

/// Parse a request body, checking the root element name.
///
/// # Errors
///
/// Returns `XmlError` for malformed XML, a wrong root element, or missing
/// required children.
pub fn from_xml<T: S3Deserialize>(xml: &[u8]) -> Result<T, XmlError> {
    let mut reader = Reader::from_reader(xml);

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = local_name(&e)?;
                if name != T::ROOT {
                    return Err(XmlError::UnexpectedElement(format!(
                        "expected <{}>, found <{name}>",
                        T::ROOT
                    )));
                }
                return T::deserialize_xml(&mut reader);
            }
            Event::Eof => return Err(XmlError::MissingElement(T::ROOT.to_owned())),
            _ => {}
        }
    }
}

fn local_name(e: &BytesStart<'_>) -> Result<String, XmlError> {
    std::str::from_utf8(e.local_name().as_ref())
        .map(ToOwned::to_owned)
        .map_err(|err| XmlError::ParseError(err.to_string()))
}

/// Read text up to the end tag, resolving entity references.
///
/// Surrounding whitespace is dropped; entity boundaries split text events,
/// so trimming per event would eat interior spaces.
fn read_text_content(reader: &mut Reader<&[u8]>) -> Result<String, XmlError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                text.push_str(&decoded);
            }
            Event::CData(e) => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Event::GeneralRef(e) => {
                if let Some(ch) = e
                    .resolve_char_ref()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?
                {
                    text.push(ch);
                } else {
                    let name = e
                        .decode()
                        .map_err(|err| XmlError::ParseError(err.to_string()))?;
                    let resolved = quick_xml::escape::resolve_predefined_entity(&name)
                        .ok_or_else(|| XmlError::ParseError(format!("unknown entity &{name};")))?;
                    text.push_str(resolved);
                }
            }
            Event::Start(e) => {
                return Err(XmlError::UnexpectedElement(local_name(&e)?));
            }
            Event::End(_) => return Ok(text.trim().to_owned()),
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while reading text content".to_owned(),
                ));
            }
            _ => {}
        }
    }
}

fn skip_element(reader: &mut Reader<&[u8]>) -> Result<(), XmlError> {
    let mut depth: u32 = 1;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while skipping element".to_owned(),
                ));
            }
            _ => {}
        }
    }
}

/// Walk the children of the current element, handing each start tag to `on_child`.
fn for_each_child<F>(reader: &mut Reader<&[u8]>, context: &str, mut on_child: F) -> Result<(), XmlError>
where
    F: FnMut(&mut Reader<&[u8]>, &BytesStart<'_>, &str) -> Result<(), XmlError>,
{
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = local_name(&e)?;
                on_child(reader, &e, &name)?;
            }
            // Self-closing children carry no content.
            Event::Empty(_) => {}
            Event::End(_) => return Ok(()),
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(format!(
                    "unexpected EOF in {context}"
                )));
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// CompleteMultipartUpload
// ---------------------------------------------------------------------------

/// Body of a CompleteMultipartUpload request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompleteMultipartUploadRequest {
    /// Parts in the order the client listed them.
    pub parts: Vec<CompletedPart>,
}

impl S3Deserialize for CompleteMultipartUploadRequest {
    const ROOT: &'static str = "CompleteMultipartUpload";

    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut parts = Vec::new();
        for_each_child(reader, "CompleteMultipartUpload", |reader, _, name| {
            if name == "Part" {
                parts.push(read_completed_part(reader)?);
                Ok(())
            } else {
                skip_element(reader)
            }
        })?;
        Ok(Self { parts })
    }
}

fn read_completed_part(reader: &mut Reader<&[u8]>) -> Result<CompletedPart, XmlError> {
    let mut part_number = None;
    let mut etag = None;
    for_each_child(reader, "Part", |reader, _, name| {
        match name {
            "PartNumber" => {
                let raw = read_text_content(reader)?;
                part_number = Some(raw.trim().parse::<u32>().map_err(|e| {
                    XmlError::ParseError(format!("invalid PartNumber '{raw}': {e}"))
                })?);
            }
            "ETag" => etag = Some(read_text_content(reader)?),
            _ => skip_element(reader)?,
        }
        Ok(())
    })?;

    Ok(CompletedPart {
        part_number: part_number.ok_or_else(|| XmlError::MissingElement("PartNumber".to_owned()))?,
        etag: etag.ok_or_else(|| XmlError::MissingElement("ETag".to_owned()))?,
    })
}

// ---------------------------------------------------------------------------
// AccessControlPolicy
// ---------------------------------------------------------------------------

impl S3Deserialize for AccessControlPolicy {
    const ROOT: &'static str = "AccessControlPolicy";

    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut owner = None;
        let mut grants = Vec::new();
        for_each_child(reader, "AccessControlPolicy", |reader, _, name| {
            match name {
                "Owner" => owner = Some(read_owner(reader)?),
                "AccessControlList" => {
                    for_each_child(reader, "AccessControlList", |reader, _, name| {
                        if name == "Grant" {
                            grants.push(read_grant(reader)?);
                            Ok(())
                        } else {
                            skip_element(reader)
                        }
                    })?;
                }
                _ => skip_element(reader)?,
            }
            Ok(())
        })?;

        Ok(Self {
            owner: owner.ok_or_else(|| XmlError::MissingElement("Owner".to_owned()))?,
            grants,
        })
    }
}

fn read_owner(reader: &mut Reader<&[u8]>) -> Result<Owner, XmlError> {
    let mut id = None;
    let mut display_name = None;
    for_each_child(reader, "Owner", |reader, _, name| {
        match name {
            "ID" => id = Some(read_text_content(reader)?),
            "DisplayName" => display_name = Some(read_text_content(reader)?),
            _ => skip_element(reader)?,
        }
        Ok(())
    })?;

    let id = id.ok_or_else(|| XmlError::MissingElement("Owner/ID".to_owned()))?;
    Ok(Owner {
        display_name: display_name.unwrap_or_else(|| id.clone()),
        id,
    })
}

fn read_grant(reader: &mut Reader<&[u8]>) -> Result<Grant, XmlError> {
    let mut grantee = None;
    let mut permission = None;
    for_each_child(reader, "Grant", |reader, start, name| {
        match name {
            "Grantee" => grantee = Some(read_grantee(reader, xsi_type(start)?)?),
            "Permission" => {
                let raw = read_text_content(reader)?;
                permission = Some(
                    Permission::parse(raw.trim())
                        .ok_or_else(|| XmlError::ParseError(format!("invalid Permission '{raw}'")))?,
                );
            }
            _ => skip_element(reader)?,
        }
        Ok(())
    })?;

    Ok(Grant {
        grantee: grantee.ok_or_else(|| XmlError::MissingElement("Grantee".to_owned()))?,
        permission: permission.ok_or_else(|| XmlError::MissingElement("Permission".to_owned()))?,
    })
}

/// The `xsi:type` attribute of a `<Grantee>` start tag, if present.
fn xsi_type(start: &BytesStart<'_>) -> Result<Option<String>, XmlError> {
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == b"type" {
            return Ok(Some(String::from_utf8_lossy(&attr.value).into_owned()));
        }
    }
    Ok(None)
}

fn read_grantee(reader: &mut Reader<&[u8]>, kind: Option<String>) -> Result<Grantee, XmlError> {
    let mut id = None;
    let mut display_name = None;
    let mut uri = None;
    let mut email = None;
    for_each_child(reader, "Grantee", |reader, _, name| {
        match name {
            "ID" => id = Some(read_text_content(reader)?),
            "DisplayName" => display_name = Some(read_text_content(reader)?),
            "URI" => uri = Some(read_text_content(reader)?),
            "EmailAddress" => email = Some(read_text_content(reader)?),
            _ => skip_element(reader)?,
        }
        Ok(())
    })?;

    let kind = kind.unwrap_or_else(|| {
        if uri.is_some() {
            "Group".to_owned()
        } else if email.is_some() {
            "AmazonCustomerByEmail".to_owned()
        } else {
            "CanonicalUser".to_owned()
        }
    });

    match kind.as_str() {
        "CanonicalUser" => Ok(Grantee::CanonicalUser {
            id: id.ok_or_else(|| XmlError::MissingElement("Grantee/ID".to_owned()))?,
            display_name,
        }),
        "Group" => Ok(Grantee::Group {
            uri: uri.ok_or_else(|| XmlError::MissingElement("Grantee/URI".to_owned()))?,
        }),
        other => Err(XmlError::UnexpectedElement(format!(
            "unsupported grantee type {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use s3gw_model::types::{ALL_USERS_GROUP, Identity};

    use super::*;

    #[test]
    fn test_should_parse_complete_multipart_upload() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
            <CompleteMultipartUpload xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
              <Part><PartNumber>1</PartNumber><ETag>"a54357aff0632cce46d942af68356b38"</ETag></Part>
              <Part><ETag>&quot;0c78aef83f66abc1fa1e8477f296d394&quot;</ETag><PartNumber>2</PartNumber></Part>
            </CompleteMultipartUpload>"#;

        let req: CompleteMultipartUploadRequest = from_xml(xml).unwrap();
        assert_eq!(req.parts.len(), 2);
        assert_eq!(req.parts[0].part_number, 1);
        assert_eq!(req.parts[0].etag, "\"a54357aff0632cce46d942af68356b38\"");
        assert_eq!(req.parts[1].part_number, 2);
        assert_eq!(req.parts[1].etag, "\"0c78aef83f66abc1fa1e8477f296d394\"");
    }

    #[test]
    fn test_should_reject_part_without_number() {
        let xml = b"<CompleteMultipartUpload><Part><ETag>x</ETag></Part></CompleteMultipartUpload>";
        let result: Result<CompleteMultipartUploadRequest, _> = from_xml(xml);
        assert!(matches!(result, Err(XmlError::MissingElement(_))));
    }

    #[test]
    fn test_should_reject_wrong_root_element() {
        let xml = b"<Delete><Object><Key>a</Key></Object></Delete>";
        let result: Result<CompleteMultipartUploadRequest, _> = from_xml(xml);
        assert!(matches!(result, Err(XmlError::UnexpectedElement(_))));
    }

    #[test]
    fn test_should_reject_truncated_document() {
        let xml = b"<CompleteMultipartUpload><Part><PartNumber>1</PartNumber>";
        let result: Result<CompleteMultipartUploadRequest, _> = from_xml(xml);
        assert!(result.is_err());
    }

    #[test]
    fn test_should_parse_access_control_policy() {
        let xml = br#"<AccessControlPolicy xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
              <Owner><ID>alice</ID><DisplayName>Alice</DisplayName></Owner>
              <AccessControlList>
                <Grant>
                  <Grantee xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:type="CanonicalUser">
                    <ID>alice</ID>
                  </Grantee>
                  <Permission>FULL_CONTROL</Permission>
                </Grant>
                <Grant>
                  <Grantee xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:type="Group">
                    <URI>http://acs.amazonaws.com/groups/global/AllUsers</URI>
                  </Grantee>
                  <Permission>READ</Permission>
                </Grant>
              </AccessControlList>
            </AccessControlPolicy>"#;

        let policy: AccessControlPolicy = from_xml(xml).unwrap();
        assert_eq!(policy.owner.id, "alice");
        assert_eq!(policy.owner.display_name, "Alice");
        assert_eq!(policy.grants.len(), 2);
        assert_eq!(
            policy.grants[1].grantee,
            Grantee::Group {
                uri: ALL_USERS_GROUP.to_owned()
            }
        );
        assert!(policy.grants(&Identity::Anonymous, Permission::Read));
    }

    #[test]
    fn test_should_reject_email_grantee() {
        let xml = br#"<AccessControlPolicy><Owner><ID>a</ID></Owner><AccessControlList>
              <Grant><Grantee xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:type="AmazonCustomerByEmail">
                <EmailAddress>a@example.com</EmailAddress></Grantee><Permission>READ</Permission></Grant>
            </AccessControlList></AccessControlPolicy>"#;
        let result: Result<AccessControlPolicy, _> = from_xml(xml);
        assert!(matches!(result, Err(XmlError::UnexpectedElement(_))));
    }

    #[test]
    fn test_should_reject_unknown_permission() {
        let xml = b"<AccessControlPolicy><Owner><ID>a</ID></Owner><AccessControlList>\
              <Grant><Grantee><ID>b</ID></Grantee><Permission>EVERYTHING</Permission></Grant>\
            </AccessControlList></AccessControlPolicy>";
        let result: Result<AccessControlPolicy, _> = from_xml(xml);
        assert!(matches!(result, Err(XmlError::ParseError(_))));
    }
}
