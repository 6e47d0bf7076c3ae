use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that ends the process with a failure exit code.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("invalid configuration")]
    Config,
    #[display("unable to read or write the state file")]
    State,
    #[display("unable to prepare external tools")]
    Tools,
    #[display("unable to list volumes")]
    Volumes,
    #[display("run aborted")]
    Run,
}
