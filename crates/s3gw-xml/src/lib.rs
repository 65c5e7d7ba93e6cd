//! S3 XML for the gateway.
//!
//! - [`S3Serialize`] and [`to_xml`] turn operation outputs into response bodies;
//! - [`S3Deserialize`] and [`from_xml`] parse the few request bodies S3 sends
//!   as XML (CompleteMultipartUpload, AccessControlPolicy);
//! - [`error_to_xml`] renders the flat `<Error>` document.
//!
//! Conventions: namespace `http://s3.amazonaws.com/doc/2006-03-01/`, lowercase
//! booleans, timestamps as `2006-02-03T16:45:09.000Z`.

pub mod deserialize;
pub mod error;
pub mod serialize;

pub use deserialize::{CompleteMultipartUploadRequest, S3Deserialize, from_xml};
pub use error::{XmlError, error_to_xml};
pub use serialize::{S3_NAMESPACE, S3Serialize, format_timestamp, to_xml};
