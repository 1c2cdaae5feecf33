//! Push notification template.

/// The notification shown for every push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTemplate {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Notifications sharing a tag replace each other.
    pub tag: String,
    pub require_interaction: bool,
}

impl Default for NotificationTemplate {
    fn default() -> Self {
        Self {
            title: "SIG Louga".to_string(),
            body: "Nouvelle mise à jour disponible".to_string(),
            icon: "./icons/icon-192.svg".to_string(),
            badge: "./icons/icon-192.svg".to_string(),
            tag: "sig-louga-notification".to_string(),
            require_interaction: false,
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl NotificationTemplate {
    pub fn to_options(&self) -> web_sys::NotificationOptions {
        let options = web_sys::NotificationOptions::new();
        options.set_body(&self.body);
        options.set_icon(&self.icon);
        options.set_badge(&self.badge);
        options.set_tag(&self.tag);
        options.set_require_interaction(self.require_interaction);
        options
    }
}
