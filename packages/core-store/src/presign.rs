//! AWS Signature Version 4 query-string presigning for S3-compatible stores.
//!
//! Both the S3 URL resolver and the S3 backend adapter go through
//! [`Presigner`]: every request is expressed as a presigned URL, with any
//! `x-amz-*` headers folded into the signature. Canonicalization and
//! signing are done by `aws-sigv4`; this module only builds object URLs.

use std::fmt;
use std::time::{Duration, SystemTime};

use aws_sigv4::http_request::{
    sign, PercentEncodingMode, SignableBody, SignableRequest, SignatureLocation,
    SigningParams, SigningSettings, UriPathNormalizationMode,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use chrono::{DateTime, Utc};
use http::Method;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::error::{Error, Result};

/// Longest lifetime SigV4 allows for a presigned URL.
pub const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const SERVICE: &str = "s3";
const PROVIDER: &str = "polystore";

/// Object keys keep `/` and the SigV4 unreserved set.
const KEY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');
const SEGMENT: &AsciiSet = &KEY.add(b'/');

/// Access key pair used for signing.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    #[must_use]
    pub fn with_session_token(mut self, token: Option<String>) -> Self {
        self.session_token = token;
        self
    }

    fn identity(&self) -> Identity {
        aws_credential_types::Credentials::new(
            self.access_key_id.clone(),
            self.secret_access_key.clone(),
            self.session_token.clone(),
            None,
            PROVIDER,
        )
        .into()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A request to presign.
#[derive(Debug, Clone)]
pub struct PresignRequest<'a> {
    pub method: Method,
    pub key: &'a str,
    pub expires: Duration,
    pub now: DateTime<Utc>,
    /// Extra query parameters, e.g. `("acl", "")`.
    pub query: Vec<(String, String)>,
    /// Headers the client will send and that must be signed.
    pub headers: Vec<(String, String)>,
}

impl<'a> PresignRequest<'a> {
    pub fn new(method: Method, key: &'a str, expires: Duration) -> Self {
        Self {
            method,
            key,
            expires,
            now: Utc::now(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Signs requests against one bucket.
#[derive(Debug, Clone)]
pub struct Presigner {
    credentials: Credentials,
    region: String,
    bucket: String,
    endpoint: Url,
    path_style: bool,
}

impl Presigner {
    /// `endpoint` defaults to `https://s3.<region>.amazonaws.com`.
    pub fn new(
        credentials: Credentials,
        region: impl Into<String>,
        bucket: impl Into<String>,
        endpoint: Option<&str>,
        path_style: bool,
    ) -> Result<Self> {
        let region = region.into();
        let endpoint = match endpoint {
            Some(endpoint) => endpoint.to_string(),
            None => format!("https://s3.{}.amazonaws.com", region),
        };
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| Error::validation(&endpoint, format!("invalid endpoint url: {}", e)))?;
        if endpoint.host_str().is_none() {
            return Err(Error::validation(
                endpoint.as_str(),
                "endpoint url has no host",
            ));
        }
        Ok(Self {
            credentials,
            region,
            bucket: bucket.into(),
            endpoint,
            path_style,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn url(&self, key: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        let mut path = url.path().trim_end_matches('/').to_string();
        if self.path_style {
            path.push('/');
            path.extend(utf8_percent_encode(&self.bucket, SEGMENT));
        } else {
            let host = format!("{}.{}", self.bucket, url.host_str().unwrap_or_default());
            url.set_host(Some(&host))
                .map_err(|e| Error::validation(&host, format!("invalid bucket host: {}", e)))?;
        }
        path.push('/');
        path.extend(utf8_percent_encode(key.trim_start_matches('/'), KEY));
        url.set_path(&path);
        Ok(url)
    }

    /// Unsigned URL of an object.
    pub fn object_url(&self, key: &str) -> Result<String> {
        Ok(self.url(key)?.into())
    }

    /// Path used in `x-amz-copy-source` for `key` in this bucket.
    pub fn copy_source(&self, key: &str) -> String {
        format!(
            "/{}/{}",
            utf8_percent_encode(&self.bucket, SEGMENT),
            utf8_percent_encode(key.trim_start_matches('/'), KEY)
        )
    }

    /// Presign a bare `method` request for `key`.
    pub fn presign(&self, method: Method, key: &str, expires: Duration) -> Result<String> {
        self.presign_request(&PresignRequest::new(method, key, expires))
    }

    pub fn presign_request(&self, request: &PresignRequest<'_>) -> Result<String> {
        validate_expiry(request.expires)?;

        let mut url = self.url(request.key)?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &request.query {
                pairs.append_pair(name, value);
            }
        }

        let mut settings = SigningSettings::default();
        settings.signature_location = SignatureLocation::QueryParams;
        settings.expires_in = Some(request.expires);
        settings.percent_encoding_mode = PercentEncodingMode::Single;
        settings.uri_path_normalization_mode = UriPathNormalizationMode::Disabled;

        let identity = self.credentials.identity();
        let params: SigningParams<'_> = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(SERVICE)
            .time(SystemTime::from(request.now))
            .settings(settings)
            .build()
            .map_err(|e| Error::validation("signing parameters", e.to_string()))?
            .into();

        let headers: Vec<(String, String)> = request
            .headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
            .collect();
        let signable = SignableRequest::new(
            request.method.as_str(),
            url.as_str(),
            headers.iter().map(|(name, value)| (name.as_str(), value.as_str())),
            SignableBody::UnsignedPayload,
        )
        .map_err(|e| Error::validation(url.as_str(), e.to_string()))?;
        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| Error::validation(request.key, e.to_string()))?
            .into_parts();

        let (_, signed_query) = instructions.into_parts();
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &signed_query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url.into())
    }
}

/// Reject lifetimes SigV4 cannot express.
pub fn validate_expiry(expires: Duration) -> Result<()> {
    if expires.as_secs() == 0 {
        return Err(Error::validation(
            format!("{:?}", expires),
            "presigned url lifetime must be at least one second",
        ));
    }
    if expires > MAX_PRESIGN_EXPIRY {
        return Err(Error::validation(
            format!("{:?}", expires),
            "presigned url lifetime exceeds 7 days",
        ));
    }
    Ok(())
}
