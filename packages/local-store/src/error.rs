use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum LocalError {
    #[error("root path '{}' is invalid: {error}", path.display())]
    RootPathInvalid {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
}
