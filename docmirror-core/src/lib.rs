mod client;
mod oauth;
mod query;

pub use client::{
    ApiErrorClass, DOCUMENT_MIME_TYPE, DriveClient, DriveError, DriveFile, FOLDER_MIME_TYPE,
    FileList,
};
pub use oauth::{DRIVE_READONLY_SCOPE, OAuthClient, OAuthError, OAuthToken};
pub use query::FileQuery;
