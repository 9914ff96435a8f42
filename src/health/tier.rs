//! Per-tier client table.

use crate::types::ClientRegistration;
use std::collections::HashMap;

#[derive(Default)]
pub struct TierState {
    pub clients: Vec<ClientRegistration>,
    pub pinged_clients: HashMap<u32, ClientRegistration>,
    pub check_in_progress: bool,
}
