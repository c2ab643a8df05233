//! # SegurosPy Channels
//!
//! Outbound notification channels.
//!
//! ```text
//! NotifyGateway (NotificationGateway)
//!   ├── send_push → TelegramPush (Bot API sendMessage, HTML)
//!   └── send_mail → SmtpMailer   (lettre, STARTTLS)
//! ```

pub mod email;
pub mod gateway;
pub mod telegram;

pub use email::SmtpMailer;
pub use gateway::NotifyGateway;
pub use telegram::TelegramPush;
