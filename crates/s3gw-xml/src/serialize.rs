//! Response body encoding.
//!
//! Each output type writes its child elements; [`to_xml`] adds the XML
//! declaration and the namespaced root element.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

use s3gw_model::output::{
    CompleteMultipartUploadOutput, CopyObjectOutput, CreateMultipartUploadOutput,
    GetBucketLocationOutput, ListBucketsOutput, ListMultipartUploadsOutput, ListObjectsOutput,
    ListObjectsV2Output, ListPartsOutput,
};
use s3gw_model::types::{
    AccessControlPolicy, BucketInfo, Grant, Grantee, ObjectSummary, Owner, PartInfo, UploadInfo,
};

use crate::error::XmlError;

/// The S3 XML namespace.
pub const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

const STORAGE_CLASS: &str = "STANDARD";

/// A value that writes itself as child elements of the current element.
///
/// Uses `io::Result` because `quick_xml::Writer` closures require it.
pub trait S3Serialize {
    /// Write this value's child elements.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if writing to the underlying writer fails.
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()>;
}

/// Serialize `value` under a namespaced `root_element` with an XML declaration.
///
/// # Errors
///
/// Returns `XmlError` if serialization fails.
pub fn to_xml<T: S3Serialize>(root_element: &str, value: &T) -> Result<Vec<u8>, XmlError> {
    let mut buf = Vec::with_capacity(512);
    let mut writer = Writer::new(&mut buf);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer
        .create_element(root_element)
        .with_attribute(("xmlns", S3_NAMESPACE))
        .write_inner_content(|w| value.serialize_xml(w))?;

    Ok(buf)
}

/// Format a timestamp the way S3 XML bodies carry it.
#[must_use]
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn text<W: Write>(writer: &mut Writer<W>, tag: &str, value: &str) -> io::Result<()> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(value))?;
    Ok(())
}

fn opt_text<W: Write>(writer: &mut Writer<W>, tag: &str, value: Option<&str>) -> io::Result<()> {
    match value {
        Some(v) => text(writer, tag, v),
        None => Ok(()),
    }
}

fn boolean<W: Write>(writer: &mut Writer<W>, tag: &str, value: bool) -> io::Result<()> {
    text(writer, tag, if value { "true" } else { "false" })
}

fn number<W: Write, N: ToString>(writer: &mut Writer<W>, tag: &str, value: N) -> io::Result<()> {
    text(writer, tag, &value.to_string())
}

fn timestamp<W: Write>(writer: &mut Writer<W>, tag: &str, value: &DateTime<Utc>) -> io::Result<()> {
    text(writer, tag, &format_timestamp(value))
}

fn owner_element<W: Write>(writer: &mut Writer<W>, tag: &str, owner: &Owner) -> io::Result<()> {
    writer.create_element(tag).write_inner_content(|w| {
        text(w, "ID", &owner.id)?;
        text(w, "DisplayName", &owner.display_name)
    })?;
    Ok(())
}

fn common_prefixes<W: Write>(writer: &mut Writer<W>, prefixes: &[String]) -> io::Result<()> {
    for prefix in prefixes {
        writer
            .create_element("CommonPrefixes")
            .write_inner_content(|w| text(w, "Prefix", prefix))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared records
// ---------------------------------------------------------------------------

impl S3Serialize for Owner {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        owner_element(writer, "Owner", self)
    }
}

impl S3Serialize for BucketInfo {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Bucket").write_inner_content(|w| {
            text(w, "Name", &self.name)?;
            timestamp(w, "CreationDate", &self.creation_date)
        })?;
        Ok(())
    }
}

impl S3Serialize for ObjectSummary {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Contents").write_inner_content(|w| {
            text(w, "Key", &self.key)?;
            timestamp(w, "LastModified", &self.last_modified)?;
            text(w, "ETag", &self.etag)?;
            number(w, "Size", self.size)?;
            text(w, "StorageClass", STORAGE_CLASS)?;
            if let Some(owner) = &self.owner {
                owner.serialize_xml(w)?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for PartInfo {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Part").write_inner_content(|w| {
            number(w, "PartNumber", self.part_number)?;
            timestamp(w, "LastModified", &self.last_modified)?;
            text(w, "ETag", &self.etag)?;
            number(w, "Size", self.size)
        })?;
        Ok(())
    }
}

impl S3Serialize for UploadInfo {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Upload").write_inner_content(|w| {
            text(w, "Key", &self.key)?;
            text(w, "UploadId", &self.upload_id)?;
            owner_element(w, "Initiator", &self.owner)?;
            self.owner.serialize_xml(w)?;
            text(w, "StorageClass", STORAGE_CLASS)?;
            timestamp(w, "Initiated", &self.initiated)
        })?;
        Ok(())
    }
}

impl S3Serialize for Grantee {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        let kind = match self {
            Self::CanonicalUser { .. } => "CanonicalUser",
            Self::Group { .. } => "Group",
        };
        writer
            .create_element("Grantee")
            .with_attribute(("xmlns:xsi", XSI_NAMESPACE))
            .with_attribute(("xsi:type", kind))
            .write_inner_content(|w| match self {
                Self::CanonicalUser { id, display_name } => {
                    text(w, "ID", id)?;
                    opt_text(w, "DisplayName", display_name.as_deref())
                }
                Self::Group { uri } => text(w, "URI", uri),
            })?;
        Ok(())
    }
}

impl S3Serialize for Grant {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Grant").write_inner_content(|w| {
            self.grantee.serialize_xml(w)?;
            text(w, "Permission", self.permission.as_str())
        })?;
        Ok(())
    }
}

impl S3Serialize for AccessControlPolicy {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        self.owner.serialize_xml(writer)?;
        writer
            .create_element("AccessControlList")
            .write_inner_content(|w| {
                for grant in &self.grants {
                    grant.serialize_xml(w)?;
                }
                Ok(())
            })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Operation outputs
// ---------------------------------------------------------------------------

impl S3Serialize for ListBucketsOutput {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        self.owner.serialize_xml(writer)?;
        writer.create_element("Buckets").write_inner_content(|w| {
            for bucket in &self.buckets {
                bucket.serialize_xml(w)?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for GetBucketLocationOutput {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        if !self.location_constraint.is_empty() {
            writer.write_event(Event::Text(BytesText::new(&self.location_constraint)))?;
        }
        Ok(())
    }
}

impl S3Serialize for ListObjectsOutput {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        text(writer, "Name", &self.name)?;
        text(writer, "Prefix", &self.prefix)?;
        text(writer, "Marker", &self.marker)?;
        number(writer, "MaxKeys", self.max_keys)?;
        opt_text(writer, "Delimiter", self.delimiter.as_deref())?;
        boolean(writer, "IsTruncated", self.is_truncated)?;
        opt_text(writer, "NextMarker", self.next_marker.as_deref())?;
        for obj in &self.contents {
            obj.serialize_xml(writer)?;
        }
        common_prefixes(writer, &self.common_prefixes)
    }
}

impl S3Serialize for ListObjectsV2Output {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        text(writer, "Name", &self.name)?;
        text(writer, "Prefix", &self.prefix)?;
        number(writer, "KeyCount", self.key_count)?;
        number(writer, "MaxKeys", self.max_keys)?;
        opt_text(writer, "Delimiter", self.delimiter.as_deref())?;
        boolean(writer, "IsTruncated", self.is_truncated)?;
        opt_text(
            writer,
            "ContinuationToken",
            self.continuation_token.as_deref(),
        )?;
        opt_text(
            writer,
            "NextContinuationToken",
            self.next_continuation_token.as_deref(),
        )?;
        opt_text(writer, "StartAfter", self.start_after.as_deref())?;
        for obj in &self.contents {
            obj.serialize_xml(writer)?;
        }
        common_prefixes(writer, &self.common_prefixes)
    }
}

impl S3Serialize for ListMultipartUploadsOutput {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        text(writer, "Bucket", &self.bucket)?;
        text(writer, "KeyMarker", &self.key_marker)?;
        text(writer, "UploadIdMarker", &self.upload_id_marker)?;
        opt_text(writer, "NextKeyMarker", self.next_key_marker.as_deref())?;
        opt_text(
            writer,
            "NextUploadIdMarker",
            self.next_upload_id_marker.as_deref(),
        )?;
        text(writer, "Prefix", &self.prefix)?;
        number(writer, "MaxUploads", self.max_uploads)?;
        boolean(writer, "IsTruncated", self.is_truncated)?;
        for upload in &self.uploads {
            upload.serialize_xml(writer)?;
        }
        Ok(())
    }
}

impl S3Serialize for CopyObjectOutput {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        text(writer, "ETag", &self.etag)?;
        timestamp(writer, "LastModified", &self.last_modified)
    }
}

impl S3Serialize for CreateMultipartUploadOutput {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        text(writer, "Bucket", &self.bucket)?;
        text(writer, "Key", &self.key)?;
        text(writer, "UploadId", &self.upload_id)
    }
}

impl S3Serialize for ListPartsOutput {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        text(writer, "Bucket", &self.bucket)?;
        text(writer, "Key", &self.key)?;
        text(writer, "UploadId", &self.upload_id)?;
        owner_element(writer, "Initiator", &self.owner)?;
        self.owner.serialize_xml(writer)?;
        text(writer, "StorageClass", STORAGE_CLASS)?;
        number(writer, "PartNumberMarker", self.part_number_marker)?;
        if let Some(next) = self.next_part_number_marker {
            number(writer, "NextPartNumberMarker", next)?;
        }
        number(writer, "MaxParts", self.max_parts)?;
        boolean(writer, "IsTruncated", self.is_truncated)?;
        for part in &self.parts {
            part.serialize_xml(writer)?;
        }
        Ok(())
    }
}

impl S3Serialize for CompleteMultipartUploadOutput {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        text(writer, "Location", &self.location)?;
        text(writer, "Bucket", &self.bucket)?;
        text(writer, "Key", &self.key)?;
        text(writer, "ETag", &self.etag)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use s3gw_model::types::{ALL_USERS_GROUP, CannedAcl, Permission};

    use super::*;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    fn render<T: S3Serialize>(root: &str, value: &T) -> String {
        String::from_utf8(to_xml(root, value).unwrap()).unwrap()
    }

    #[test]
    fn test_should_serialize_list_buckets() {
        let output = ListBucketsOutput {
            owner: Owner::new("alice"),
            buckets: vec![BucketInfo {
                name: "photos".to_owned(),
                creation_date: ts(),
                owner: Owner::new("alice"),
            }],
        };
        let xml = render("ListAllMyBucketsResult", &output);
        assert!(xml.contains(r#"<ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#));
        assert!(xml.contains("<Owner><ID>alice</ID><DisplayName>alice</DisplayName></Owner>"));
        assert!(xml.contains(
            "<Buckets><Bucket><Name>photos</Name><CreationDate>2024-03-01T12:30:00.000Z</CreationDate></Bucket></Buckets>"
        ));
    }

    #[test]
    fn test_should_serialize_list_objects_v2_with_common_prefixes() {
        let output = ListObjectsV2Output {
            name: "bkt".to_owned(),
            delimiter: Some("/".to_owned()),
            max_keys: 1000,
            key_count: 2,
            contents: vec![ObjectSummary {
                key: "d".to_owned(),
                size: 3,
                etag: "\"abc\"".to_owned(),
                last_modified: ts(),
                owner: None,
            }],
            common_prefixes: vec!["a/".to_owned()],
            ..Default::default()
        };
        let xml = render("ListBucketResult", &output);
        assert!(xml.contains("<KeyCount>2</KeyCount>"));
        assert!(xml.contains("<IsTruncated>false</IsTruncated>"));
        assert!(xml.contains("<Contents><Key>d</Key>"));
        assert!(xml.contains("abc"));
        assert!(xml.contains("<CommonPrefixes><Prefix>a/</Prefix></CommonPrefixes>"));
        assert!(!xml.contains("<NextContinuationToken>"));
    }

    #[test]
    fn test_should_serialize_acl_with_xsi_type() {
        let policy =
            AccessControlPolicy::from_canned(CannedAcl::PublicRead, Owner::new("alice"), None);
        let xml = render("AccessControlPolicy", &policy);
        assert!(xml.contains(r#"xsi:type="CanonicalUser""#));
        assert!(xml.contains(r#"xsi:type="Group""#));
        assert!(xml.contains(&format!("<URI>{ALL_USERS_GROUP}</URI>")));
        assert!(xml.contains(&format!(
            "<Permission>{}</Permission>",
            Permission::FullControl
        )));
    }

    #[test]
    fn test_should_serialize_location_constraint_as_text() {
        let xml = render(
            "LocationConstraint",
            &GetBucketLocationOutput {
                location_constraint: "eu-west-1".to_owned(),
            },
        );
        assert!(xml.ends_with(
            r#"<LocationConstraint xmlns="http://s3.amazonaws.com/doc/2006-03-01/">eu-west-1</LocationConstraint>"#
        ));
    }

    #[test]
    fn test_should_serialize_multipart_upload_listing() {
        let output = ListMultipartUploadsOutput {
            bucket: "bkt".to_owned(),
            key_marker: "a".to_owned(),
            upload_id_marker: "u-0".to_owned(),
            next_key_marker: Some("big.bin".to_owned()),
            next_upload_id_marker: Some("u-1".to_owned()),
            max_uploads: 1,
            is_truncated: true,
            uploads: vec![UploadInfo {
                key: "big.bin".to_owned(),
                upload_id: "u-1".to_owned(),
                initiated: ts(),
                owner: Owner::new("bob"),
            }],
            ..Default::default()
        };
        let xml = render("ListMultipartUploadsResult", &output);
        assert!(xml.contains("<Upload><Key>big.bin</Key><UploadId>u-1</UploadId>"));
        assert!(xml.contains("<Initiated>2024-03-01T12:30:00.000Z</Initiated>"));
        assert!(xml.contains("<UploadIdMarker>u-0</UploadIdMarker>"));
        assert!(xml.contains("<NextKeyMarker>big.bin</NextKeyMarker>"));
        assert!(xml.contains("<NextUploadIdMarker>u-1</NextUploadIdMarker>"));
    }

    #[test]
    fn test_should_serialize_complete_multipart_result() {
        let output = CompleteMultipartUploadOutput {
            location: "/bkt/big.bin".to_owned(),
            bucket: "bkt".to_owned(),
            key: "big.bin".to_owned(),
            etag: "\"0123-3\"".to_owned(),
        };
        let xml = render("CompleteMultipartUploadResult", &output);
        assert!(xml.contains("<Location>/bkt/big.bin</Location>"));
        assert!(xml.contains("0123-3"));
    }
}
