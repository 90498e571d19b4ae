/// Reverse URL resolution
///
/// Serializers and redirects refer to pages by logical name. The route table
/// maps those names to path templates with `{}` placeholders filled in
/// order from the percent-encoded arguments.

use std::collections::HashMap;

/// Turns a logical view name plus arguments into a path
pub trait UrlResolver: Send + Sync {
    fn resolve(&self, name: &str, args: &[&str]) -> Option<String>;
}

pub mod names {
    pub const FRONT_PAGE: &str = "front-page";
    pub const SOUND: &str = "sound";
    pub const ACCOUNT: &str = "account";
    pub const API_SOUND_LIST: &str = "apiv2-sound-list";
    pub const API_SOUND_DETAIL: &str = "apiv2-sound-detail";
    pub const API_USER_DETAIL: &str = "apiv2-user-detail";
    pub const API_USER_SOUND_LIST: &str = "apiv2-user-sound-list";
    pub const TICKET: &str = "tickets-ticket";
    pub const TICKETS_HOME: &str = "tickets-home";
    pub const MODERATION_HOME: &str = "tickets-moderation-home";
    pub const MODERATION_ASSIGNED: &str = "tickets-moderation-assigned";
}

/// Static name → path template table
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: HashMap<&'static str, &'static str>,
}

impl Default for RouteTable {
    fn default() -> Self {
        let routes = HashMap::from([
            (names::FRONT_PAGE, "/"),
            (names::SOUND, "/people/{}/sounds/{}/"),
            (names::ACCOUNT, "/people/{}/"),
            (names::API_SOUND_LIST, "/apiv2/sounds/"),
            (names::API_SOUND_DETAIL, "/apiv2/sounds/{}/"),
            (names::API_USER_DETAIL, "/apiv2/users/{}/"),
            (names::API_USER_SOUND_LIST, "/apiv2/users/{}/sounds/"),
            (names::TICKET, "/tickets/{}/"),
            (names::TICKETS_HOME, "/tickets/home/"),
            (names::MODERATION_HOME, "/tickets/moderation/"),
            (names::MODERATION_ASSIGNED, "/tickets/moderation/assigned/{}/"),
        ]);

        Self { routes }
    }
}

impl UrlResolver for RouteTable {
    fn resolve(&self, name: &str, args: &[&str]) -> Option<String> {
        let template = self.routes.get(name)?;
        let pieces: Vec<&str> = template.split("{}").collect();

        if pieces.len() != args.len() + 1 {
            tracing::warn!(
                "Route {} expects {} arguments, got {}",
                name,
                pieces.len() - 1,
                args.len()
            );
            return None;
        }

        let mut path = String::from(pieces[0]);
        for (arg, rest) in args.iter().zip(&pieces[1..]) {
            path.push_str(&urlencoding::encode(arg));
            path.push_str(rest);
        }

        Some(path)
    }
}

/// Make a site-relative path absolute
pub fn prepend_base(site_domain: &str, path: &str) -> String {
    format!("http://{}{}", site_domain, path)
}
