/// Build and return an `Err(Error::...)` in one step.
#[macro_export]
macro_rules! Err {
	($($args:tt)*) => {
		Err($crate::err!($($args)*))
	};
}

/// Construct an `Error`, optionally logging at the same time.
///
/// `err!(error!("..."))` logs at error level and wraps the formatted message
/// in `Error::Err`; `err!(Variant("..."))` constructs a typed variant without
/// logging (the call site is expected to log, if at all, with the extra
/// context - room ID, event ID - that the variant itself doesn't carry).
#[macro_export]
macro_rules! err {
	(error!($($args:tt),+)) => {{
		$crate::error!($($args),+);
		$crate::error::Error::Err(std::format!($($args),+))
	}};

	($variant:ident(error!($($args:tt),+))) => {{
		$crate::error!($($args),+);
		$crate::error::Error::$variant(std::format!($($args),+))
	}};

	(Config($item:literal, $($args:tt),+)) => {{
		$crate::error::Error::Config($item, std::format!($($args),+))
	}};

	($variant:ident($($args:tt),+)) => {
		$crate::error::Error::$variant(std::format!($($args),+))
	};

	($string:literal$(,)? $($args:tt),*) => {
		$crate::error::Error::Err(std::format!($string, $($args),*))
	};
}
