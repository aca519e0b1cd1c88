use crate::extractors::RejectionType;
use crate::{TENANT_ID_HEADER, USER_ID_HEADER};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use domain::identity::Identity;
use domain::Id;
use log::*;

/// The caller as resolved by the upstream auth gateway.
///
/// Credentials are never checked here: the gateway authenticates and then
/// injects the tenant and user ids as headers.
pub(crate) struct AuthenticatedIdentity(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedIdentity
where
    S: Send + Sync,
{
    type Rejection = RejectionType;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = header_id(parts, TENANT_ID_HEADER)?;
        let user_id = header_id(parts, USER_ID_HEADER)?;
        Ok(AuthenticatedIdentity(Identity::new(tenant_id, user_id)))
    }
}

fn header_id(parts: &Parts, name: &str) -> Result<Id, RejectionType> {
    let value = parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            debug!("Request without {name} header");
            (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
        })?;

    Id::parse_str(value).map_err(|_| {
        warn!("Request with malformed {name} header");
        (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(headers: &[(&str, String)]) -> Result<Identity, RejectionType> {
        let mut builder = Request::builder().uri("/ws");
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthenticatedIdentity::from_request_parts(&mut parts, &())
            .await
            .map(|AuthenticatedIdentity(identity)| identity)
    }

    #[tokio::test]
    async fn both_headers_resolve_an_identity() {
        let tenant_id = Id::new_v4();
        let user_id = Id::new_v4();

        let identity = extract(&[
            (TENANT_ID_HEADER, tenant_id.to_string()),
            (USER_ID_HEADER, user_id.to_string()),
        ])
        .await
        .unwrap();

        assert_eq!(identity, Identity::new(tenant_id, user_id));
    }

    #[tokio::test]
    async fn missing_tenant_is_unauthorized() {
        let (status, _) = extract(&[(USER_ID_HEADER, Id::new_v4().to_string())])
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_user_id_is_unauthorized() {
        let (status, _) = extract(&[
            (TENANT_ID_HEADER, Id::new_v4().to_string()),
            (USER_ID_HEADER, "alice".to_owned()),
        ])
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
