use std::time::Duration;

use chrono::{DateTime, Utc};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use http::{HeaderValue, Method, StatusCode};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};

use polystore_core::presign::{Credentials, PresignRequest, Presigner};
use polystore_core::{
    AdapterConfig, Backend, BackendError, BackendResult, ByteStream, Bytes, Visibility,
    WriteOptions,
};

use crate::error::Error;

/// Lifetime of the presigned URL behind each request.
pub const REQUEST_EXPIRY: Duration = Duration::from_secs(15 * 60);

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
const ALL_USERS_GROUP: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

lazy_static! {
    static ref GRANT: Regex = Regex::new(r"(?s)<Grant\b[^>]*>(.*?)</Grant>").unwrap();
    static ref PERMISSION: Regex =
        Regex::new(r"<Permission>\s*([A-Z_]+)\s*</Permission>").unwrap();
}

/// A backend over one bucket of an S3-compatible object store.
///
/// Objects map to keys one to one. A rename is a copy followed by a delete.
///
/// # Example
///
/// ```no_run
/// use polystore_core::presign::{Credentials, Presigner};
/// use polystore_core::{Backend, WriteOptions};
/// use polystore_s3::S3Backend;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let presigner = Presigner::new(
///     Credentials::new("AKIA...", "secret"),
///     "eu-west-1",
///     "media",
///     None,
///     false,
/// )?;
/// let backend = S3Backend::new(presigner);
/// backend.write("docs/a.txt", b"hello", &WriteOptions::new())?;
/// # Ok(())
/// # }
/// ```
pub struct S3Backend {
    client: Client,
    presigner: Presigner,
}

impl S3Backend {
    pub fn new(presigner: Presigner) -> Self {
        Self::with_client(Client::new(), presigner)
    }

    /// Use a preconfigured reqwest client (timeouts, proxies, TLS).
    pub fn with_client(client: Client, presigner: Presigner) -> Self {
        Self { client, presigner }
    }

    /// Build a backend from an `s3` adapter configuration.
    pub fn from_config(config: &AdapterConfig) -> Result<Self, polystore_core::Error> {
        match config {
            AdapterConfig::S3 {
                bucket,
                region,
                endpoint,
                access_key,
                secret_key,
                session_token,
                path_style,
            } => {
                let credentials = Credentials::new(access_key.as_str(), secret_key.as_str())
                    .with_session_token(session_token.clone());
                let presigner = Presigner::new(
                    credentials,
                    region.as_str(),
                    bucket.as_str(),
                    endpoint.as_deref(),
                    *path_style,
                )?;
                Ok(Self::new(presigner))
            }
            other => Err(polystore_core::Error::validation(
                other.kind(),
                "not an s3 adapter configuration",
            )),
        }
    }

    pub fn bucket(&self) -> &str {
        self.presigner.bucket()
    }

    fn request(
        &self,
        method: Method,
        key: &str,
        query: &[(&str, &str)],
        headers: &[(&str, String)],
    ) -> Result<RequestBuilder, Error> {
        let mut presign = PresignRequest::new(method.clone(), key, REQUEST_EXPIRY);
        for (name, value) in query {
            presign = presign.query(*name, *value);
        }
        for (name, value) in headers {
            presign = presign.header(*name, value.as_str());
        }
        let url = self.presigner.presign_request(&presign)?;

        let mut builder = self.client.request(method, url);
        for (name, value) in headers {
            builder = builder.header(*name, HeaderValue::from_str(value)?);
        }
        Ok(builder)
    }

    fn send(&self, builder: RequestBuilder, key: &str) -> BackendResult<Response> {
        let response = builder.send().map_err(Error::from)?;
        let status = response.status();
        log::debug!("s3 {} -> {}", key, status);
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::not_found(key));
        }
        let message = response.text().unwrap_or_default();
        Err(BackendError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    fn head(&self, key: &str) -> BackendResult<Response> {
        let builder = self.request(Method::HEAD, key, &[], &[])?;
        self.send(builder, key)
    }

    fn write_headers(options: &WriteOptions) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(mime_type) = &options.mime_type {
            headers.push(("content-type", mime_type.clone()));
        }
        if let Some(visibility) = options.visibility {
            headers.push(("x-amz-acl", canned_acl(visibility).to_string()));
        }
        headers
    }
}

fn canned_acl(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "public-read",
        Visibility::Private => "private",
    }
}

/// Whether an ACL policy lets everyone read the object.
fn grants_public_read(policy: &str) -> bool {
    GRANT.captures_iter(policy).any(|grant| {
        let grant = &grant[1];
        grant.contains(ALL_USERS_GROUP)
            && PERMISSION
                .captures(grant)
                .is_some_and(|permission| matches!(&permission[1], "READ" | "FULL_CONTROL"))
    })
}

fn header<'r>(response: &'r Response, name: http::HeaderName) -> Option<&'r str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

impl Backend for S3Backend {
    fn exists(&self, path: &str) -> BackendResult<bool> {
        match self.head(path) {
            Ok(_) => Ok(true),
            Err(BackendError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read(&self, path: &str) -> BackendResult<Bytes> {
        let builder = self.request(Method::GET, path, &[], &[])?;
        let response = self.send(builder, path)?;
        Ok(response.bytes().map_err(Error::from)?)
    }

    fn read_stream(&self, path: &str) -> BackendResult<ByteStream> {
        let builder = self.request(Method::GET, path, &[], &[])?;
        Ok(Box::new(self.send(builder, path)?))
    }

    fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> BackendResult<()> {
        let headers = Self::write_headers(options);
        let builder = self
            .request(Method::PUT, path, &[], &headers)?
            .body(contents.to_vec());
        self.send(builder, path)?;
        Ok(())
    }

    fn delete(&self, path: &str) -> BackendResult<()> {
        // DELETE succeeds on missing keys.
        self.head(path)?;
        let builder = self.request(Method::DELETE, path, &[], &[])?;
        self.send(builder, path)?;
        Ok(())
    }

    fn copy(&self, path: &str, new_path: &str, options: &WriteOptions) -> BackendResult<()> {
        let mut headers = Self::write_headers(options);
        headers.push(("x-amz-copy-source", self.presigner.copy_source(path)));
        if options.mime_type.is_some() {
            headers.push(("x-amz-metadata-directive", "REPLACE".to_string()));
        }
        let builder = self.request(Method::PUT, new_path, &[], &headers)?;
        self.send(builder, path)?;
        Ok(())
    }

    fn rename(&self, path: &str, new_path: &str, options: &WriteOptions) -> BackendResult<()> {
        self.copy(path, new_path, options)?;
        let builder = self.request(Method::DELETE, path, &[], &[])?;
        self.send(builder, path)?;
        Ok(())
    }

    fn last_modified(&self, path: &str) -> BackendResult<DateTime<Utc>> {
        let response = self.head(path)?;
        let value = header(&response, LAST_MODIFIED).ok_or_else(|| {
            BackendError::from(Error::MalformedResponse {
                message: "missing Last-Modified header".to_string(),
            })
        })?;
        DateTime::parse_from_rfc2822(value)
            .map(|date| date.with_timezone(&Utc))
            .map_err(|e| {
                Error::MalformedResponse {
                    message: format!("bad Last-Modified header '{}': {}", value, e),
                }
                .into()
            })
    }

    fn file_size(&self, path: &str) -> BackendResult<u64> {
        let response = self.head(path)?;
        header(&response, CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                Error::MalformedResponse {
                    message: "missing Content-Length header".to_string(),
                }
                .into()
            })
    }

    fn mime_type(&self, path: &str) -> BackendResult<String> {
        let response = self.head(path)?;
        Ok(header(&response, CONTENT_TYPE)
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string())
    }

    fn visibility(&self, path: &str) -> BackendResult<Visibility> {
        let builder = self.request(Method::GET, path, &[("acl", "")], &[])?;
        let policy = self.send(builder, path)?.text().map_err(Error::from)?;
        if grants_public_read(&policy) {
            Ok(Visibility::Public)
        } else {
            Ok(Visibility::Private)
        }
    }

    fn set_visibility(&self, path: &str, visibility: Visibility) -> BackendResult<()> {
        let headers = [("x-amz-acl", canned_acl(visibility).to_string())];
        let builder = self.request(Method::PUT, path, &[("acl", "")], &headers)?;
        self.send(builder, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(grantee: &str, permission: &str) -> String {
        format!(
            "<Grant><Grantee xsi:type=\"Group\"><URI>{}</URI></Grantee>\
             <Permission>{}</Permission></Grant>",
            grantee, permission
        )
    }

    #[test]
    fn only_read_grants_to_everyone_are_public() {
        let owner = "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";
        for (grants, public) in [
            (vec![grant(ALL_USERS_GROUP, "READ")], true),
            (vec![grant(ALL_USERS_GROUP, "FULL_CONTROL")], true),
            (vec![grant(ALL_USERS_GROUP, "WRITE")], false),
            (vec![grant(ALL_USERS_GROUP, "READ_ACP")], false),
            (vec![grant(owner, "READ")], false),
            (vec![grant(ALL_USERS_GROUP, "WRITE"), grant(owner, "READ")], false),
            (vec![grant(owner, "FULL_CONTROL"), grant(ALL_USERS_GROUP, "READ")], true),
        ] {
            let policy = format!(
                "<AccessControlPolicy><AccessControlList>{}</AccessControlList></AccessControlPolicy>",
                grants.concat()
            );
            assert_eq!(grants_public_read(&policy), public, "{policy}");
        }
    }
}
