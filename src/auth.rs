use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use tracing::debug;

use crate::tenant::tenant_file_stem;

/// Cleartext login shared by every tenant. The startup database name selects
/// the tenant, so a name that could never open one is refused at login
/// rather than on the first statement.
#[derive(Debug)]
pub struct InnkeepAuthSource {
    password: Vec<u8>,
}

impl InnkeepAuthSource {
    pub fn new(password: String) -> Self {
        Self {
            password: password.into_bytes(),
        }
    }

    /// Password to check against, once the requested tenant is acceptable.
    /// No database means the default tenant.
    fn admit(&self, database: Option<&str>) -> PgWireResult<Password> {
        if let Some(db) = database
            && let Err(e) = tenant_file_stem(db)
        {
            debug!(database = db, error = %e, "login refused");
            return Err(PgWireError::UserError(Box::new(ErrorInfo::new(
                "FATAL".into(),
                "3D000".into(),
                format!("invalid database name: {e}"),
            ))));
        }
        Ok(Password::new(None, self.password.clone()))
    }
}

#[async_trait]
impl AuthSource for InnkeepAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        self.admit(login.database())
    }
}
