//! Status helper enums mapping to SMALLINT columns.
//!
//! Each enum variant's discriminant matches the CHECK-constrained id
//! range in `migrations/0001_initial.sql`.

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Generation job lifecycle. Forward-only:
    /// `Pending -> Processing -> Completed | Failed`.
    GenerationStatus {
        Pending = 1,
        Processing = 2,
        Completed = 3,
        Failed = 4,
    }
}

impl GenerationStatus {
    /// Whether this status permits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

define_status_enum! {
    /// Published asset lifecycle.
    AssetStatus {
        Pending = 1,
        Processing = 2,
        Ready = 3,
        Failed = 4,
    }
}

define_status_enum! {
    /// Who can see a published asset.
    AssetVisibility {
        Public = 1,
        Private = 2,
        Unlisted = 3,
    }
}
