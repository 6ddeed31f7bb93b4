// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

use std::sync::Arc;

use crate::auth::JwtAuthBackend;
use crate::users::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<JwtAuthBackend>,
}

impl AppState {
    pub fn new(auth: JwtAuthBackend) -> Self {
        Self {
            auth: Arc::new(auth),
        }
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        self.auth.users()
    }
}
