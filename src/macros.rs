macro_rules! invalid_format {
    ($s:expr) => {
        $crate::types::Error::InvalidFormat($s.into())
    };
    ($fmt:expr, $($args:tt)*) => {
        $crate::types::Error::InvalidFormat(format!($fmt, $($args)*).into())
    }
}

macro_rules! unexpected_eof {
    () => {
        $crate::types::Error::UnexpectedEndOfFile(None)
    };
    ($s:expr) => {
        $crate::types::Error::UnexpectedEndOfFile(Some($s.into()))
    };
    ($fmt:expr, $($args:tt)*) => {
        $crate::types::Error::UnexpectedEndOfFile(Some(format!($fmt, $($args)*).into()))
    }
}

macro_rules! not_found {
    ($s:expr) => {
        $crate::types::Error::NotFound($s.into())
    };
    ($fmt:expr, $($args:tt)*) => {
        $crate::types::Error::NotFound(format!($fmt, $($args)*).into())
    }
}

/// Attaches context to an end-of-file error coming from the cursor, leaving other errors alone.
macro_rules! try_if_eof {
    ($e:expr, $s:expr) => {
        $e.map_err(|e| match e {
            $crate::types::Error::UnexpectedEndOfFile(_) => unexpected_eof!($s),
            e => e,
        })?
    };
    ($e:expr, $fmt:expr, $($args:tt)*) => {
        $e.map_err(|e| match e {
            $crate::types::Error::UnexpectedEndOfFile(_) => unexpected_eof!($fmt, $($args)*),
            e => e,
        })?
    }
}
