mod file;
mod repository;
mod user;

pub use file::{FileKey, FileSnapshot, RemoteSha, LOCAL_SHA};
pub use repository::{NewRepository, RemoteRepository, RepositoryId, RepositoryRecord};
pub use user::{AccessToken, NewUser, RemoteUser, User, UserId};
