//! Master/slave role negotiation.
//!
//! The relay is authoritative for roles; [`RoleCoordinator`] only mirrors
//! what it is told, keeps the reclaim token in a [`CredentialStore`], and
//! answers the single authorisation question the rest of the client asks:
//! [`operations_disabled`](RoleCoordinator::operations_disabled).

use tracing::{debug, info};

use crate::connection::ConnectionManager;
use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::protocol::{ClientId, ClientMessage, ClientType, Role, RoleAssignment, RoleChanged};

/// Interprets role envelopes and owns the reclaim credential.
#[derive(Debug)]
pub struct RoleCoordinator<S> {
    client_type: ClientType,
    store: S,
    role: Role,
    client_id: Option<ClientId>,
    master_client_id: Option<ClientId>,
}

impl<S: CredentialStore> RoleCoordinator<S> {
    pub fn new(client_type: ClientType, store: S) -> Self {
        Self {
            client_type,
            store,
            role: Role::Unassigned,
            client_id: None,
            master_client_id: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        self.client_id.as_ref()
    }

    /// Identity of the current master as last reported by the relay.
    pub fn master_client_id(&self) -> Option<&ClientId> {
        self.master_client_id.as_ref()
    }

    /// `true` whenever the operator surface must refuse mutations.
    pub fn operations_disabled(&self) -> bool {
        self.role.operations_disabled()
    }

    /// The handshake for a freshly opened connection, carrying any stored token.
    pub fn handshake(&self) -> ClientMessage {
        ClientMessage::Handshake {
            client_type: self.client_type,
            master_token: self.store.get(),
        }
    }

    /// Apply the assignment the relay sends right after the handshake.
    pub fn on_role_assignment(&mut self, assignment: RoleAssignment) {
        info!(
            role = %assignment.role,
            client_id = %assignment.client_id,
            "role assigned"
        );
        self.role = assignment.role;
        self.client_id = Some(assignment.client_id);
        self.master_client_id = assignment.master_client_id;
        if assignment.role == Role::Master {
            if let Some(token) = assignment.master_token {
                self.store.set(token);
            }
        }
    }

    /// Apply a later role change (failover, release confirmation, ...).
    ///
    /// A message that both grants a token and asks for a clear ends with no
    /// token stored.
    pub fn on_role_changed(&mut self, change: RoleChanged) {
        info!(
            role = %change.new_role,
            reason = change.reason.as_deref().unwrap_or(""),
            "role changed"
        );
        self.role = change.new_role;
        if let Some(id) = change.client_id {
            self.client_id = Some(id);
        }
        if change.master_client_id.is_some() {
            self.master_client_id = change.master_client_id;
        }
        if change.new_role == Role::Master {
            if let Some(token) = change.master_token {
                self.store.set(token);
            }
        }
        if change.clear_token == Some(true) {
            debug!("relay asked to clear the master token");
            self.store.clear();
        }
    }

    /// Give up mastership.
    ///
    /// Only valid as master; returns `Ok(false)` otherwise. The local token
    /// is cleared before the request goes out, and the role itself stays
    /// until the relay confirms with `role_changed`.
    ///
    /// # Errors
    ///
    /// Propagates the send failure from the connection manager.
    pub async fn release_master(&mut self, conn: &mut ConnectionManager) -> Result<bool> {
        if self.role != Role::Master {
            debug!(role = %self.role, "release_master ignored: not master");
            return Ok(false);
        }
        info!("releasing mastership");
        self.store.clear();
        conn.send(&ClientMessage::ReleaseMaster).await?;
        Ok(true)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;

    fn coordinator() -> (RoleCoordinator<MemoryCredentialStore>, MemoryCredentialStore) {
        let store = MemoryCredentialStore::new();
        (
            RoleCoordinator::new(ClientType::Operation, store.clone()),
            store,
        )
    }

    fn assignment(role: Role, token: Option<&str>) -> RoleAssignment {
        RoleAssignment {
            role,
            client_id: "c1".into(),
            master_client_id: Some("c1".into()),
            master_token: token.map(Into::into),
        }
    }

    fn change(new_role: Role) -> RoleChanged {
        RoleChanged {
            new_role,
            reason: None,
            client_id: None,
            master_client_id: None,
            master_token: None,
            clear_token: None,
        }
    }

    #[test]
    fn master_assignment_stores_token() {
        let (mut roles, store) = coordinator();
        roles.on_role_assignment(assignment(Role::Master, Some("T1")));

        assert_eq!(roles.role(), Role::Master);
        assert_eq!(roles.client_id(), Some(&ClientId::from("c1")));
        assert_eq!(store.get().as_deref(), Some("T1"));
        assert!(!roles.operations_disabled());
    }

    #[test]
    fn slave_assignment_ignores_token_and_disables_operations() {
        let (mut roles, store) = coordinator();
        roles.on_role_assignment(assignment(Role::Slave, Some("stray")));

        assert!(store.get().is_none());
        assert!(roles.operations_disabled());
    }

    #[test]
    fn handshake_presents_stored_token() {
        let (mut roles, _store) = coordinator();
        assert_eq!(
            roles.handshake(),
            ClientMessage::Handshake {
                client_type: ClientType::Operation,
                master_token: None
            }
        );

        roles.on_role_assignment(assignment(Role::Master, Some("T1")));
        assert_eq!(
            roles.handshake(),
            ClientMessage::Handshake {
                client_type: ClientType::Operation,
                master_token: Some("T1".into())
            }
        );
    }

    #[test]
    fn promotion_stores_new_token() {
        let (mut roles, store) = coordinator();
        roles.on_role_assignment(assignment(Role::Slave, None));

        roles.on_role_changed(RoleChanged {
            master_token: Some("T2".into()),
            master_client_id: Some(7.into()),
            reason: Some("master_disconnected".into()),
            ..change(Role::Master)
        });

        assert_eq!(roles.role(), Role::Master);
        assert_eq!(store.get().as_deref(), Some("T2"));
        assert_eq!(roles.master_client_id(), Some(&ClientId::Number(7)));
    }

    #[test]
    fn clear_token_instruction_forgets_credential() {
        let (mut roles, store) = coordinator();
        roles.on_role_assignment(assignment(Role::Master, Some("T1")));

        roles.on_role_changed(RoleChanged {
            clear_token: Some(true),
            ..change(Role::Slave)
        });

        assert_eq!(roles.role(), Role::Slave);
        assert!(store.get().is_none());
    }

    #[test]
    fn demotion_without_clear_keeps_token() {
        let (mut roles, store) = coordinator();
        roles.on_role_assignment(assignment(Role::Master, Some("T1")));
        roles.on_role_changed(change(Role::Slave));
        assert_eq!(store.get().as_deref(), Some("T1"));
    }

    #[test]
    fn clear_wins_over_token_in_same_message() {
        let (mut roles, store) = coordinator();
        roles.on_role_changed(RoleChanged {
            master_token: Some("T9".into()),
            clear_token: Some(true),
            ..change(Role::Master)
        });
        assert!(store.get().is_none());
    }
}
