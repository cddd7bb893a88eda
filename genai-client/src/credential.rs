//! API credential resolution and persistence.
//!
//! Resolution walks an ordered list of resolvers: the in-memory session
//! value, then the persistent store, then the build-time fallback. New
//! sources are added by pushing another resolver, call sites stay untouched.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::{Arc, RwLock};
use studio_core::error::AppError;
use studio_core::store::KeyValueStore;

/// Every backend key starts with this prefix.
pub const CREDENTIAL_PREFIX: &str = "AIza";

/// Storage key for the persisted credential.
pub const CREDENTIAL_STORAGE_KEY: &str = "genai_api_key";

/// Bearer secret for the generative backend.
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    /// Validate raw user input.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidCredentialFormat(
                "API key must not be empty".to_string(),
            ));
        }
        if !trimmed.starts_with(CREDENTIAL_PREFIX) {
            return Err(AppError::InvalidCredentialFormat(format!(
                "API key should start with \"{}\"",
                CREDENTIAL_PREFIX
            )));
        }
        Ok(Self(SecretString::new(trimmed.to_string())))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// One source in the resolution chain.
pub trait CredentialResolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self) -> Option<Credential>;
}

type SessionSlot = Arc<RwLock<Option<Credential>>>;

struct SessionResolver {
    slot: SessionSlot,
}

impl CredentialResolver for SessionResolver {
    fn name(&self) -> &'static str {
        "session"
    }

    fn resolve(&self) -> Option<Credential> {
        self.slot.read().ok().and_then(|guard| guard.clone())
    }
}

struct PersistedResolver {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialResolver for PersistedResolver {
    fn name(&self) -> &'static str {
        "persisted"
    }

    fn resolve(&self) -> Option<Credential> {
        match self.store.get(CREDENTIAL_STORAGE_KEY) {
            Ok(Some(raw)) => match Credential::parse(&raw) {
                Ok(credential) => Some(credential),
                Err(_) => {
                    tracing::warn!("Ignoring persisted credential with invalid format");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted credential");
                None
            }
        }
    }
}

/// Build-time or environment supplied credential.
pub struct StaticResolver {
    credential: Option<Credential>,
}

impl StaticResolver {
    pub fn new(raw: Option<&str>) -> Self {
        let credential = raw.and_then(|raw| match Credential::parse(raw) {
            Ok(c) => Some(c),
            Err(_) => {
                tracing::warn!("Ignoring fallback credential with invalid format");
                None
            }
        });
        Self { credential }
    }
}

impl CredentialResolver for StaticResolver {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn resolve(&self) -> Option<Credential> {
        self.credential.clone()
    }
}

pub struct CredentialStore {
    session: SessionSlot,
    store: Arc<dyn KeyValueStore>,
    resolvers: Vec<Box<dyn CredentialResolver>>,
}

impl CredentialStore {
    /// Standard chain: session, persisted, then `fallback`.
    pub fn new(store: Arc<dyn KeyValueStore>, fallback: Option<&str>) -> Self {
        let session: SessionSlot = Arc::new(RwLock::new(None));
        let resolvers: Vec<Box<dyn CredentialResolver>> = vec![
            Box::new(SessionResolver {
                slot: session.clone(),
            }),
            Box::new(PersistedResolver {
                store: store.clone(),
            }),
            Box::new(StaticResolver::new(fallback)),
        ];

        Self {
            session,
            store,
            resolvers,
        }
    }

    /// Append a resolver with the lowest priority.
    pub fn push_resolver(&mut self, resolver: Box<dyn CredentialResolver>) {
        self.resolvers.push(resolver);
    }

    /// First credential any resolver yields, or `None`.
    ///
    /// A credential found below the session level is cached for the session.
    pub fn get(&self) -> Option<Credential> {
        for resolver in &self.resolvers {
            if let Some(credential) = resolver.resolve() {
                tracing::debug!(source = resolver.name(), "Resolved API credential");
                if resolver.name() != "session" {
                    self.cache(credential.clone());
                }
                return Some(credential);
            }
        }
        None
    }

    /// Like [`get`](Self::get), failing before any network call when absent.
    pub fn require(&self) -> Result<Credential, AppError> {
        self.get().ok_or_else(|| {
            tracing::error!("API credential is missing from every source");
            AppError::CredentialMissing
        })
    }

    /// Validate and store a new credential, replacing any previous one.
    pub fn set(&self, raw: &str) -> Result<Credential, AppError> {
        let credential = Credential::parse(raw)?;
        self.store.set(CREDENTIAL_STORAGE_KEY, credential.expose())?;
        self.cache(credential.clone());
        tracing::info!("API credential updated");
        Ok(credential)
    }

    /// Forget the session and persisted copies. The fallback stays.
    pub fn clear(&self) -> Result<(), AppError> {
        self.store.remove(CREDENTIAL_STORAGE_KEY)?;
        if let Ok(mut slot) = self.session.write() {
            *slot = None;
        }
        tracing::info!("API credential cleared");
        Ok(())
    }

    fn cache(&self, credential: Credential) {
        if let Ok(mut slot) = self.session.write() {
            *slot = Some(credential);
        }
    }
}
