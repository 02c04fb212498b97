use tonic::{metadata::MetadataMap, Request, Status};

const UUID_HEADER: &str = "uuid";
const AUTHORIZATION_HEADER: &str = "authorization";

/// Identifies the agent on the other end of a call.
///
/// The authenticating interceptor reads the identity from call metadata,
/// verifies the token and stores the identity in the request's extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionIdentity {
    pub uuid: String,
    pub token: String,
}

// === impl ConnectionIdentity ===

impl ConnectionIdentity {
    pub fn from_metadata(metadata: &MetadataMap) -> Result<Self, Status> {
        let uuid = header(metadata, UUID_HEADER)
            .ok_or_else(|| Status::unauthenticated("no identity"))?;
        let token = header(metadata, AUTHORIZATION_HEADER)
            .ok_or_else(|| Status::unauthenticated("no authorization"))?;
        Ok(Self { uuid, token })
    }

    /// Returns the identity established for a request.
    pub fn from_request<T>(req: &Request<T>) -> Result<Self, Status> {
        req.extensions()
            .get::<Self>()
            .cloned()
            .ok_or_else(|| Status::invalid_argument("invalid connection"))
    }

    /// Attaches the identity to a request.
    pub fn insert<T>(self, req: &mut Request<T>) {
        req.extensions_mut().insert(self);
    }
}

fn header(metadata: &MetadataMap, key: &str) -> Option<String> {
    let value = metadata.get(key)?.to_str().ok()?;
    if value.is_empty() {
        return None;
    }
    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_metadata() {
        let mut md = MetadataMap::new();
        assert_eq!(
            ConnectionIdentity::from_metadata(&md).unwrap_err().message(),
            "no identity"
        );

        md.insert("uuid", "agent-0".parse().unwrap());
        let err = ConnectionIdentity::from_metadata(&md).unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unauthenticated);
        assert_eq!(err.message(), "no authorization");

        md.insert("authorization", "token-0".parse().unwrap());
        assert_eq!(
            ConnectionIdentity::from_metadata(&md).unwrap(),
            ConnectionIdentity {
                uuid: "agent-0".to_string(),
                token: "token-0".to_string(),
            }
        );
    }

    #[test]
    fn from_request() {
        let mut req = Request::new(());
        let err = ConnectionIdentity::from_request(&req).unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
        assert_eq!(err.message(), "invalid connection");

        let id = ConnectionIdentity {
            uuid: "agent-0".to_string(),
            token: "token-0".to_string(),
        };
        id.clone().insert(&mut req);
        assert_eq!(ConnectionIdentity::from_request(&req).unwrap(), id);
    }
}
