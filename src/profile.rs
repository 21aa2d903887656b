use crate::errors::{AppError, AppResult};
use crate::models::SignUpPayload;
use crate::notify::{Notification, NotificationHub};
use crate::storage::{EntryRepository, KeyValueStore, PROFILE_IMAGE_KEY, USER_NAME_KEY};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_USER_NAME: &str = "User";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    pub user_name: String,
    pub initials: String,
    pub profile_image: Option<String>,
    pub is_logged_in: bool,
}

/// Local-only identity: a display name and an avatar. No credentials are kept.
pub struct ProfileStore {
    name_repo: EntryRepository<Option<String>>,
    image_repo: EntryRepository<Option<String>>,
    notifications: NotificationHub,
}

impl ProfileStore {
    pub fn new(store: Arc<dyn KeyValueStore>, notifications: NotificationHub) -> Self {
        Self {
            name_repo: EntryRepository::new(store.clone(), USER_NAME_KEY),
            image_repo: EntryRepository::new(store, PROFILE_IMAGE_KEY),
            notifications,
        }
    }

    pub fn user_name(&self) -> AppResult<String> {
        Ok(self
            .name_repo
            .load()?
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER_NAME.to_string()))
    }

    pub fn profile_image(&self) -> AppResult<Option<String>> {
        self.image_repo.load()
    }

    pub fn is_logged_in(&self) -> AppResult<bool> {
        Ok(self.profile_image()?.is_some())
    }

    pub fn snapshot(&self) -> AppResult<ProfileSnapshot> {
        let user_name = self.user_name()?;
        let profile_image = self.profile_image()?;
        Ok(ProfileSnapshot {
            initials: initials(&user_name),
            is_logged_in: profile_image.is_some(),
            user_name,
            profile_image,
        })
    }

    pub fn sign_up(&self, payload: SignUpPayload) -> AppResult<ProfileSnapshot> {
        if payload.name.trim().is_empty() || payload.email.trim().is_empty() {
            return Err(self.reject("Missing information", "Please enter your name and email."));
        }
        if payload.password != payload.confirm_password {
            return Err(self.reject("Passwords Don't Match", "Please make sure your passwords match."));
        }

        self.name_repo.save(&Some(payload.name.trim().to_string()))?;
        if let Some(image) = payload.profile_image.filter(|image| !image.is_empty()) {
            self.image_repo.save(&Some(image))?;
        }

        tracing::info!("local account created");
        self.notifications.emit(Notification::info(
            "Account Created",
            "Welcome to MindfulSpace! Your account has been created successfully.",
        ));
        self.snapshot()
    }

    pub fn log_in(&self, email: &str) -> AppResult<ProfileSnapshot> {
        let local_part = email.split('@').next().unwrap_or_default().trim();
        if local_part.is_empty() {
            return Err(self.reject("Missing information", "Please enter your email."));
        }
        self.name_repo.save(&Some(local_part.to_string()))?;
        self.notifications
            .emit(Notification::info("Login Successful", "Welcome back to MindfulSpace!"));
        self.snapshot()
    }

    pub fn log_out(&self) -> AppResult<()> {
        self.image_repo.delete()?;
        self.name_repo.delete()?;
        tracing::info!("logged out");
        Ok(())
    }

    /// Stores the avatar as a `data:` URL.
    pub fn set_profile_image(&self, mime: &str, bytes: &[u8]) -> AppResult<String> {
        if !mime.starts_with("image/") {
            return Err(AppError::Validation(format!("unsupported image type '{}'", mime)));
        }
        if bytes.is_empty() {
            return Err(AppError::Validation("image is empty".to_string()));
        }
        let url = format!("data:{};base64,{}", mime, STANDARD.encode(bytes));
        self.image_repo.save(&Some(url.clone()))?;
        self.notifications.emit(Notification::info(
            "Profile picture updated",
            "Your profile picture has been updated successfully.",
        ));
        Ok(url)
    }

    fn reject(&self, title: &str, description: &str) -> AppError {
        self.notifications.emit(Notification::destructive(title, description));
        AppError::Validation(description.to_string())
    }
}

pub fn initials(name: &str) -> String {
    name.chars().take(2).collect::<String>().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::{initials, ProfileStore};
    use crate::errors::AppError;
    use crate::models::SignUpPayload;
    use crate::notify::{drain, NotificationHub, NotificationVariant};
    use crate::storage::{KeyValueStore, MemoryStore, PROFILE_IMAGE_KEY, USER_NAME_KEY};
    use std::sync::Arc;

    fn sign_up(password: &str, confirm: &str) -> SignUpPayload {
        SignUpPayload {
            name: "Robin".to_string(),
            email: "robin@example.com".to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
            profile_image: None,
        }
    }

    #[test]
    fn defaults_to_anonymous_user() {
        let profile = ProfileStore::new(Arc::new(MemoryStore::new()), NotificationHub::new());
        let snapshot = profile.snapshot().expect("snapshot");
        assert_eq!(snapshot.user_name, "User");
        assert_eq!(snapshot.initials, "US");
        assert!(!snapshot.is_logged_in);
    }

    #[test]
    fn mismatched_passwords_are_rejected_without_writing() {
        let hub = NotificationHub::new();
        let mut receiver = hub.subscribe();
        let profile = ProfileStore::new(Arc::new(MemoryStore::new()), hub);

        let err = profile.sign_up(sign_up("a", "b")).expect_err("mismatch");
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(profile.user_name().expect("name"), "User");

        let notes = drain(&mut receiver);
        assert_eq!(notes[0].title, "Passwords Don't Match");
        assert_eq!(notes[0].variant, NotificationVariant::Destructive);
    }

    #[test]
    fn sign_up_then_log_out() {
        let profile = ProfileStore::new(Arc::new(MemoryStore::new()), NotificationHub::new());
        let snapshot = profile.sign_up(sign_up("pw", "pw")).expect("sign up");
        assert_eq!(snapshot.user_name, "Robin");
        assert_eq!(snapshot.initials, "RO");

        profile.log_out().expect("log out");
        assert_eq!(profile.user_name().expect("name"), "User");
    }

    #[test]
    fn log_in_uses_email_local_part() {
        let profile = ProfileStore::new(Arc::new(MemoryStore::new()), NotificationHub::new());
        assert_eq!(profile.log_in("sam.lee@example.com").expect("log in").user_name, "sam.lee");
        assert!(profile.log_in("@example.com").is_err());
    }

    #[test]
    fn avatar_is_stored_as_data_url_and_marks_logged_in() {
        let profile = ProfileStore::new(Arc::new(MemoryStore::new()), NotificationHub::new());
        let url = profile.set_profile_image("image/png", &[1, 2, 3]).expect("avatar");
        assert_eq!(url, "data:image/png;base64,AQID");
        assert!(profile.is_logged_in().expect("logged in"));
        assert!(profile.set_profile_image("text/plain", b"hi").is_err());
    }

    #[test]
    fn plain_text_values_from_older_installs_are_kept() {
        let store = Arc::new(MemoryStore::new());
        store.set(USER_NAME_KEY, "Alice").expect("seed name");
        store.set(PROFILE_IMAGE_KEY, "data:image/png;base64,AQID").expect("seed image");

        let snapshot = ProfileStore::new(store, NotificationHub::new()).snapshot().expect("snapshot");
        assert_eq!(snapshot.user_name, "Alice");
        assert_eq!(snapshot.profile_image.as_deref(), Some("data:image/png;base64,AQID"));
        assert!(snapshot.is_logged_in);
    }

    #[test]
    fn initials_handle_short_and_multibyte_names() {
        assert_eq!(initials("a"), "A");
        assert_eq!(initials("élan"), "ÉL");
    }
}
