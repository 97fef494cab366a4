//! Certificate revocation.

use tracing::info;
use x509_parser::pem::parse_x509_pem;

use easyacme_common::{CertificateId, EasyAcmeError, EasyAcmeResult};

use crate::accounts::AccountRegistrar;
use crate::model::CertificateStatus;

#[derive(Debug, Clone)]
pub struct Revoker {
    accounts: AccountRegistrar,
}

impl Revoker {
    pub fn new(accounts: AccountRegistrar) -> Self {
        Self { accounts }
    }

    /// Revoke an issued certificate at the CA, then mark it revoked.
    ///
    /// The stored status is untouched when the CA call fails.
    pub async fn revoke(&self, id: &CertificateId) -> EasyAcmeResult<()> {
        let store = self.accounts.store();
        let certificate = store
            .certificate(id)?
            .ok_or_else(|| EasyAcmeError::not_found("certificate", id.as_str()))?;

        match certificate.status {
            CertificateStatus::Issued => {}
            CertificateStatus::Revoked => {
                return Err(EasyAcmeError::Conflict(format!(
                    "certificate '{}' is already revoked",
                    id
                )))
            }
            CertificateStatus::NotIssued => {
                return Err(EasyAcmeError::validation(format!(
                    "certificate '{}' has not been issued",
                    id
                )))
            }
        }

        let (_, pem) = parse_x509_pem(certificate.certificate.as_bytes()).map_err(|e| {
            EasyAcmeError::Internal(format!("stored certificate '{}' is not PEM: {}", id, e))
        })?;

        let account = self.accounts.load(&certificate.account_id)?;
        let engine = self.accounts.open_session(&account).await?;
        engine
            .revoke_certificate(&pem.contents)
            .await
            .map_err(|e| e.into_error("revoke certificate"))?;

        store.set_certificate_status(id, CertificateStatus::Revoked)?;
        info!(
            certificate_id = %id,
            domain = certificate.primary_domain(),
            "Revoked certificate"
        );
        Ok(())
    }
}
