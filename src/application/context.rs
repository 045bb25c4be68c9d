//! Request-scoped view shared by public handlers.

use serde::Serialize;

use crate::application::auth::{AuthContext, AuthService};
use crate::application::listing::{ListingError, ListingService};
use crate::domain::navigation::NavigationIndex;

/// Session state plus sidebar navigation for one request. Tag and year
/// path segments are validated against `navigation` before they reach the
/// listing cache.
#[derive(Debug, Clone)]
pub struct SiteContext {
    pub auth: AuthContext,
    pub navigation: NavigationIndex,
}

impl SiteContext {
    pub async fn assemble(
        auth: &AuthService,
        listings: &ListingService,
        cookie: Option<&str>,
    ) -> Result<Self, ListingError> {
        let auth = auth.resolve(cookie).await;
        let navigation = listings.sidebar().await?;
        Ok(Self { auth, navigation })
    }

    pub fn chrome(&self) -> Chrome<'_> {
        Chrome {
            authenticated: self.auth.is_authenticated(),
            username: self.auth.principal().map(|principal| principal.username.as_str()),
            navigation: &self.navigation,
        }
    }
}

/// Page furniture serialized next to every public listing.
#[derive(Debug, Serialize)]
pub struct Chrome<'a> {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
    pub navigation: &'a NavigationIndex,
}
