use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

/// Failure of a single gateway call.
///
/// Variants follow the libusb error codes so that a failure can always be reported
/// by its transport-layer name, see [`TransportError::name`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("input/output error")]
    Io,
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
    #[error("access denied")]
    Access,
    #[error("no such device: {0}")]
    NoDevice(String),
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("resource busy")]
    Busy,
    #[error("timeout")]
    Timeout,
    #[error("overflow")]
    Overflow,
    #[error("pipe error")]
    Pipe,
    #[error("interrupted")]
    Interrupted,
    #[error("insufficient memory")]
    NoMem,
    #[error("operation not supported on this backend: {0}")]
    Unsupported(&'static str),
    #[error("malformed response: {0}")]
    Protocol(&'static str),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// libusb-style identifier of this error, used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            TransportError::Io => "LIBUSB_ERROR_IO",
            TransportError::InvalidParam(_) => "LIBUSB_ERROR_INVALID_PARAM",
            TransportError::Access => "LIBUSB_ERROR_ACCESS",
            TransportError::NoDevice(_) => "LIBUSB_ERROR_NO_DEVICE",
            TransportError::NotFound(_) => "LIBUSB_ERROR_NOT_FOUND",
            TransportError::Busy => "LIBUSB_ERROR_BUSY",
            TransportError::Timeout => "LIBUSB_ERROR_TIMEOUT",
            TransportError::Overflow => "LIBUSB_ERROR_OVERFLOW",
            TransportError::Pipe => "LIBUSB_ERROR_PIPE",
            TransportError::Interrupted => "LIBUSB_ERROR_INTERRUPTED",
            TransportError::NoMem => "LIBUSB_ERROR_NO_MEM",
            TransportError::Unsupported(_) => "LIBUSB_ERROR_NOT_SUPPORTED",
            TransportError::Protocol(_) | TransportError::Other(_) => "LIBUSB_ERROR_OTHER",
        }
    }
}

#[cfg(feature = "usb")]
impl From<rusb::Error> for TransportError {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::Io => TransportError::Io,
            rusb::Error::InvalidParam => TransportError::InvalidParam("libusb".to_string()),
            rusb::Error::Access => TransportError::Access,
            rusb::Error::NoDevice => TransportError::NoDevice("disconnected".to_string()),
            rusb::Error::NotFound => TransportError::NotFound("libusb".to_string()),
            rusb::Error::Busy => TransportError::Busy,
            rusb::Error::Timeout => TransportError::Timeout,
            rusb::Error::Overflow => TransportError::Overflow,
            rusb::Error::Pipe => TransportError::Pipe,
            rusb::Error::Interrupted => TransportError::Interrupted,
            rusb::Error::NoMem => TransportError::NoMem,
            rusb::Error::NotSupported => TransportError::Unsupported("libusb"),
            rusb::Error::BadDescriptor => TransportError::Protocol("bad descriptor"),
            rusb::Error::Other => TransportError::Other("libusb".to_string()),
        }
    }
}
