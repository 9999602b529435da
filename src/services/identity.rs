// SPDX-License-Identifier: MIT

//! Acting-identity context: who is acting, and who they originally were.
//!
//! This is an explicit value owned by the request, loaded from and saved to
//! the cookie boundary by the auth middleware. It is never shared across
//! concurrent callers.

use crate::error::AppError;
use crate::models::User;

/// The acting principal plus, during impersonation, the original principal.
///
/// Invariant: when `original` is set it differs from `acting`; clearing
/// either clears both.
#[derive(Debug, Clone)]
pub struct ActingIdentity {
    acting: User,
    original: Option<User>,
}

impl ActingIdentity {
    pub fn new(acting: User) -> Self {
        Self {
            acting,
            original: None,
        }
    }

    /// Rebuild a persisted identity. A stale original equal to the acting
    /// principal is dropped to restore the invariant.
    pub fn resume(acting: User, original: Option<User>) -> Self {
        let original = original.filter(|o| o.id != acting.id);
        Self { acting, original }
    }

    pub fn acting(&self) -> &User {
        &self.acting
    }

    pub fn original(&self) -> Option<&User> {
        self.original.as_ref()
    }

    /// The principal whose authority governs privileged checks: the original
    /// one while impersonating, the acting one otherwise.
    pub fn authority(&self) -> &User {
        self.original.as_ref().unwrap_or(&self.acting)
    }

    pub fn is_impersonating(&self) -> bool {
        self.original.is_some()
    }

    /// Replace the acting principal outright. A direct principal change
    /// always ends any impersonation.
    pub fn set_principal(&mut self, user: User) {
        self.acting = user;
        self.original = None;
    }

    /// Start (or retarget) an impersonation. Denied unless the authority's
    /// role may switch users; on denial the state is left untouched.
    pub fn switch_to(&mut self, target: User) -> Result<(), AppError> {
        if !self.authority().role.can_switch_user() {
            return Err(AppError::Forbidden(
                "switching users requires the system administrator role".to_string(),
            ));
        }

        // Switching back to the original ends the impersonation.
        if self.original.as_ref().is_some_and(|o| o.id == target.id) {
            self.switch_back();
            return Ok(());
        }

        if self.original.is_none() {
            if self.acting.id == target.id {
                return Ok(());
            }
            self.original = Some(self.acting.clone());
        }

        self.acting = target;
        Ok(())
    }

    /// Restore the original principal. Returns whether anything changed.
    pub fn switch_back(&mut self) -> bool {
        match self.original.take() {
            Some(original) => {
                self.acting = original;
                true
            }
            None => false,
        }
    }
}
