/// Field-filtering serializers for API resources
///
/// Each serializer knows the fields it supports and how to compute them.
/// Output holds exactly the supported fields that the request allows; a
/// field is only computed when it is allowed, which matters for `analysis`
/// since that one reads a file.
use crate::{
    db::models::{Sound, User},
    urls::{names, prepend_base, UrlResolver},
};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Per-view default allow-lists (`None` means every field)
pub mod defaults {
    pub const SOUND_LIST: Option<&str> = Some("url,uri");
    pub const SOUND_DETAIL: Option<&str> = None;
    pub const USER_DETAIL: Option<&str> = None;
}

pub const SOUND_FIELDS: &[&str] = &[
    "id",
    "uri",
    "url",
    "original_filename",
    "user",
    "num_downloads",
    "channels",
    "duration",
    "samplerate",
    "analysis",
];

pub const USER_FIELDS: &[&str] = &["id", "uri", "url", "username", "date_joined", "sounds"];

/// Allow-list of output fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelection {
    All,
    Only(BTreeSet<String>),
}

impl FieldSelection {
    /// Parse a comma-separated list; names are trimmed and blanks dropped
    pub fn parse(raw: &str) -> Self {
        let names: BTreeSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        if names.is_empty() {
            FieldSelection::All
        } else {
            FieldSelection::Only(names)
        }
    }

    /// Effective selection for a request: the `fields` parameter when it is
    /// present and non-empty, the view default otherwise. An empty `fields=`
    /// lifts every restriction.
    pub fn for_request(requested: Option<&str>, view_default: Option<&str>) -> Self {
        match requested {
            Some(raw) if raw.is_empty() => FieldSelection::All,
            Some(raw) => Self::parse(raw),
            None => view_default.map(Self::parse).unwrap_or(FieldSelection::All),
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        match self {
            FieldSelection::All => true,
            FieldSelection::Only(names) => names.contains(name),
        }
    }
}

/// What serializers need from the running service
pub struct SerializerContext<'a> {
    pub urls: &'a dyn UrlResolver,
    pub site_domain: &'a str,
    pub analysis_directory: &'a Path,
}

impl<'a> SerializerContext<'a> {
    fn absolute(&self, name: &str, args: &[&str]) -> Value {
        match self.urls.resolve(name, args) {
            Some(path) => Value::String(prepend_base(self.site_domain, &path)),
            None => Value::Null,
        }
    }
}

/// A resource shape restricted by a [`FieldSelection`]
pub trait FieldSerializer {
    type Entity;

    /// Supported fields, in output order
    fn fields(&self) -> &'static [&'static str];

    /// Compute one supported field
    fn field(&self, entity: &Self::Entity, name: &str) -> Value;

    fn serialize(&self, entity: &Self::Entity, selection: &FieldSelection) -> Map<String, Value> {
        self.fields()
            .iter()
            .filter(|name| selection.allows(name))
            .map(|name| (name.to_string(), self.field(entity, name)))
            .collect()
    }
}

pub struct SoundSerializer<'a> {
    ctx: &'a SerializerContext<'a>,
}

impl<'a> SoundSerializer<'a> {
    pub fn new(ctx: &'a SerializerContext<'a>) -> Self {
        Self { ctx }
    }
}

impl FieldSerializer for SoundSerializer<'_> {
    type Entity = Sound;

    fn fields(&self) -> &'static [&'static str] {
        SOUND_FIELDS
    }

    fn field(&self, sound: &Sound, name: &str) -> Value {
        let id = sound.id.to_string();
        match name {
            "id" => Value::from(sound.id),
            "uri" => self.ctx.absolute(names::API_SOUND_DETAIL, &[&id]),
            "url" => self.ctx.absolute(names::SOUND, &[&sound.username, &id]),
            "original_filename" => Value::from(sound.original_filename.clone()),
            "user" => self
                .ctx
                .absolute(names::API_USER_DETAIL, &[&sound.user_id.to_string()]),
            "num_downloads" => Value::from(sound.num_downloads),
            "channels" => sound.channels.map(Value::from).unwrap_or(Value::Null),
            "duration" => sound.duration.map(Value::from).unwrap_or(Value::Null),
            "samplerate" => sound.samplerate.map(Value::from).unwrap_or(Value::Null),
            "analysis" => read_analysis(&analysis_path(self.ctx.analysis_directory, sound)),
            _ => Value::Null,
        }
    }
}

pub struct UserSerializer<'a> {
    ctx: &'a SerializerContext<'a>,
}

impl<'a> UserSerializer<'a> {
    pub fn new(ctx: &'a SerializerContext<'a>) -> Self {
        Self { ctx }
    }
}

impl FieldSerializer for UserSerializer<'_> {
    type Entity = User;

    fn fields(&self) -> &'static [&'static str] {
        USER_FIELDS
    }

    fn field(&self, user: &User, name: &str) -> Value {
        let id = user.id.to_string();
        match name {
            "id" => Value::from(user.id),
            "uri" => self.ctx.absolute(names::API_USER_DETAIL, &[&id]),
            "url" => self.ctx.absolute(names::ACCOUNT, &[&user.username]),
            "username" => Value::from(user.username.clone()),
            "date_joined" => Value::from(user.date_joined.to_rfc3339()),
            "sounds" => self.ctx.absolute(names::API_USER_SOUND_LIST, &[&id]),
            _ => Value::Null,
        }
    }
}

/// `<dir>/<id / 1000>/<id>_<user_id>_statistics.yaml`
pub fn analysis_path(analysis_directory: &Path, sound: &Sound) -> PathBuf {
    analysis_directory
        .join((sound.id / 1000).to_string())
        .join(format!("{}_{}_statistics.yaml", sound.id, sound.user_id))
}

/// Spectral centroid mean from a statistics file, or null when the file is
/// missing, unreadable or lacks the value
pub fn read_analysis(path: &Path) -> Value {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::debug!("No analysis at {}: {}", path.display(), e);
            return Value::Null;
        }
    };

    let document: serde_yaml::Value = match serde_yaml::from_str(&contents) {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!("Unparseable analysis file {}: {}", path.display(), e);
            return Value::Null;
        }
    };

    document
        .get("lowlevel")
        .and_then(|v| v.get("spectral_centroid"))
        .and_then(|v| v.get("mean"))
        .and_then(|mean| serde_json::to_value(mean).ok())
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::urls::RouteTable;
    use chrono::Utc;

    fn sound(id: i64, user_id: i64) -> Sound {
        Sound {
            id,
            user_id,
            username: "alice".to_string(),
            original_filename: "rain.wav".to_string(),
            num_downloads: 3,
            channels: Some(2),
            duration: Some(12.5),
            samplerate: Some(44100),
            moderation_state: "OK".to_string(),
            created: Utc::now(),
        }
    }

    fn keys(map: &Map<String, Value>) -> Vec<&str> {
        map.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_selection_parsing() {
        assert_eq!(
            FieldSelection::for_request(None, defaults::SOUND_LIST),
            FieldSelection::parse("uri,url")
        );
        assert_eq!(
            FieldSelection::for_request(None, defaults::SOUND_DETAIL),
            FieldSelection::All
        );
        assert_eq!(
            FieldSelection::for_request(Some(""), defaults::SOUND_LIST),
            FieldSelection::All
        );

        let selection = FieldSelection::for_request(Some(" id , duration,"), defaults::SOUND_LIST);
        assert!(selection.allows("id"));
        assert!(selection.allows("duration"));
        assert!(!selection.allows("url"));
    }

    #[test]
    fn test_output_is_supported_intersect_allowed() {
        let routes = RouteTable::default();
        let dir = tempfile::tempdir().unwrap();
        let ctx = SerializerContext {
            urls: &routes,
            site_domain: "sonora.test",
            analysis_directory: dir.path(),
        };
        let serializer = SoundSerializer::new(&ctx);

        let out = serializer.serialize(&sound(42, 7), &FieldSelection::parse("id,duration,bogus"));
        let mut got = keys(&out);
        got.sort();
        assert_eq!(got, vec!["duration", "id"]);
        assert_eq!(out["id"], Value::from(42));

        let all = serializer.serialize(&sound(42, 7), &FieldSelection::All);
        assert_eq!(all.len(), SOUND_FIELDS.len());
        assert_eq!(all["uri"], "http://sonora.test/apiv2/sounds/42/");
        assert_eq!(all["url"], "http://sonora.test/people/alice/sounds/42/");
        assert_eq!(all["user"], "http://sonora.test/apiv2/users/7/");
        assert_eq!(all["analysis"], Value::Null);
    }

    #[test]
    fn test_list_default_only_links() {
        let routes = RouteTable::default();
        let dir = tempfile::tempdir().unwrap();
        let ctx = SerializerContext {
            urls: &routes,
            site_domain: "sonora.test",
            analysis_directory: dir.path(),
        };

        let selection = FieldSelection::for_request(None, defaults::SOUND_LIST);
        let out = SoundSerializer::new(&ctx).serialize(&sound(1, 1), &selection);
        let mut got = keys(&out);
        got.sort();
        assert_eq!(got, vec!["uri", "url"]);
    }

    #[test]
    fn test_analysis_reads_spectral_centroid() {
        let dir = tempfile::tempdir().unwrap();
        let s = sound(1042, 7);
        let path = analysis_path(dir.path(), &s);
        assert!(path.ends_with("1/1042_7_statistics.yaml"));

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "lowlevel:\n  spectral_centroid:\n    mean: 1234.5\n    var: 2.0\n",
        )
        .unwrap();

        assert_eq!(read_analysis(&path), Value::from(1234.5));
    }

    #[test]
    fn test_analysis_failures_are_null() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.yaml");
        assert_eq!(read_analysis(&missing), Value::Null);

        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "lowlevel: [unclosed").unwrap();
        assert_eq!(read_analysis(&broken), Value::Null);

        let incomplete = dir.path().join("incomplete.yaml");
        std::fs::write(&incomplete, "lowlevel:\n  mfcc: 1\n").unwrap();
        assert_eq!(read_analysis(&incomplete), Value::Null);
    }

    #[test]
    fn test_user_fields() {
        let routes = RouteTable::default();
        let dir = tempfile::tempdir().unwrap();
        let ctx = SerializerContext {
            urls: &routes,
            site_domain: "sonora.test",
            analysis_directory: dir.path(),
        };
        let user = User {
            id: 7,
            username: "alice".to_string(),
            email: None,
            date_joined: Utc::now(),
            is_moderator: false,
        };

        let out = UserSerializer::new(&ctx).serialize(&user, &FieldSelection::All);
        assert_eq!(out.len(), USER_FIELDS.len());
        assert_eq!(out["url"], "http://sonora.test/people/alice/");
        assert_eq!(out["sounds"], "http://sonora.test/apiv2/users/7/sounds/");
        assert!(!out.contains_key("email"));
    }
}
