pub mod cloudinary;
pub mod mailer;
pub mod media_store;
pub mod otp;
pub mod post_deletion;
