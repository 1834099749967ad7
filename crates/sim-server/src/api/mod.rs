pub mod run_simulation;

pub mod prelude {
    pub use crate::{Config, error::Error};
    pub use actix_web::{dev::HttpServiceFactory, http::StatusCode, web};
    pub use serde::{Deserialize, Serialize};
    pub use sim::JobRegistry;

    pub struct Success;

    impl Serialize for Success {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            use serde::ser::SerializeStruct;
            let mut s = s.serialize_struct("Success", 1)?;
            s.serialize_field("success", &true)?;
            s.end()
        }
    }
}
