// Channel manager: membership, ownership and password-derived keys
//
// Passwords are never retained. A protected channel keeps only its derived
// key and the key's commitment; the commitment alone decides whether a
// proposed password is accepted.

use super::keys::{ChannelKey, KeyCommitment, KeyDerivation, Pbkdf2KeyDerivation};
use super::ChannelError;
use crate::message::ChatMessage;
use crate::store::SecureKeyStore;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name under which a channel's key is handed to the secure key store
pub fn key_store_name(channel: &str) -> String {
    format!("channel_{}", channel)
}

/// `#` followed by one or more ASCII letters, digits or hyphens
pub fn is_valid_channel_name(name: &str) -> bool {
    match name.strip_prefix('#') {
        Some(rest) => {
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        None => false,
    }
}

#[derive(Debug)]
struct ChannelState {
    creator: Option<String>,
    members: BTreeSet<String>,
    key: Option<ChannelKey>,
    commitment: Option<KeyCommitment>,
}

impl ChannelState {
    fn is_protected(&self) -> bool {
        self.commitment.is_some()
    }

    /// Key whose commitment still checks out
    fn verified_key(&self) -> Option<&ChannelKey> {
        match (&self.key, &self.commitment) {
            (Some(key), Some(commitment)) if commitment.verify(key) => Some(key),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Channels {
    channels: HashMap<String, ChannelState>,
    current: Option<String>,
    system_log: Vec<ChatMessage>,
}

impl Channels {
    fn log(&mut self, content: String) {
        info!("{}", content);
        self.system_log.push(ChatMessage::system(content));
    }

    /// The channel if `peer_id` created it and is a member
    fn owned_by(&mut self, name: &str, peer_id: &str) -> Result<&mut ChannelState, ChannelError> {
        match self.channels.get_mut(name) {
            Some(channel)
                if channel.creator.as_deref() == Some(peer_id)
                    && channel.members.contains(peer_id) =>
            {
                Ok(channel)
            }
            _ => Err(ChannelError::Unauthorized {
                channel: name.to_string(),
                peer_id: peer_id.to_string(),
            }),
        }
    }
}

/// Public view of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    pub creator: Option<String>,
    pub members: Vec<String>,
    pub password_protected: bool,
    pub commitment: Option<KeyCommitment>,
}

/// What `receive_message` made of an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// No channel, or a channel this node has not joined
    Ignored,
    /// Plaintext channel message
    Plain { channel: String },
    /// Encrypted, and the local key passed commitment verification
    Encrypted { channel: String, key: ChannelKey },
    /// Encrypted, but no verified key is held for the channel
    Undecryptable { channel: String },
}

pub struct ChannelManager {
    kdf: Arc<dyn KeyDerivation>,
    key_store: Option<Arc<dyn SecureKeyStore>>,
    state: RwLock<Channels>,
}

impl ChannelManager {
    /// PBKDF2 with the default work factor and no external key store
    pub fn new() -> Self {
        Self::with_key_derivation(Arc::new(Pbkdf2KeyDerivation::new()))
    }

    pub fn with_key_derivation(kdf: Arc<dyn KeyDerivation>) -> Self {
        Self {
            kdf,
            key_store: None,
            state: RwLock::new(Channels::default()),
        }
    }

    /// Hand every derived key to `key_store` as well
    pub fn with_key_store(mut self, key_store: Arc<dyn SecureKeyStore>) -> Self {
        self.key_store = Some(key_store);
        self
    }

    /// Create a channel owned by `creator_id`, who joins it.
    ///
    /// An empty password counts as none. Creating a channel that already
    /// exists changes nothing.
    pub fn create_channel(
        &self,
        name: &str,
        password: Option<&str>,
        creator_id: &str,
    ) -> Result<(), ChannelError> {
        if !is_valid_channel_name(name) {
            return Err(ChannelError::InvalidChannelName(name.to_string()));
        }
        let password = password.filter(|p| !p.is_empty());

        if self.state.read().channels.contains_key(name) {
            debug!("Channel {} already exists", name);
            return Ok(());
        }
        let key = password.map(|p| self.derive(p, name));

        let mut state = self.state.write();
        if state.channels.contains_key(name) {
            return Ok(());
        }

        let commitment = key.as_ref().map(ChannelKey::commitment);
        let stored = key.clone();
        state.channels.insert(
            name.to_string(),
            ChannelState {
                creator: Some(creator_id.to_string()),
                members: BTreeSet::from([creator_id.to_string()]),
                key,
                commitment,
            },
        );
        state.current = Some(name.to_string());

        if password.is_some() {
            state.log(format!("Channel {} created with password protection.", name));
        } else {
            state.log(format!("Channel {} created.", name));
        }
        drop(state);

        if let Some(key) = &stored {
            self.store_key(key, name);
        }
        Ok(())
    }

    /// Join a channel as `peer_id`.
    ///
    /// Joining again is a no-op success. A protected channel needs a
    /// password whose derived key matches the stored commitment; a wrong
    /// password is refused even for existing members. Joining an unknown
    /// channel brings it into existence without an owner; a password given
    /// then becomes the channel key, since commitments are never exchanged
    /// between nodes. An empty password counts as none.
    pub fn join(
        &self,
        name: &str,
        password: Option<&str>,
        peer_id: &str,
    ) -> Result<(), ChannelError> {
        if !is_valid_channel_name(name) {
            self.state
                .write()
                .log(format!("Invalid channel name: {}", name));
            return Err(ChannelError::InvalidChannelName(name.to_string()));
        }

        let candidate = password
            .filter(|p| !p.is_empty())
            .map(|p| self.derive(p, name));

        let mut state = self.state.write();
        let channel = state
            .channels
            .entry(name.to_string())
            .or_insert_with(|| ChannelState {
                creator: None,
                members: BTreeSet::new(),
                key: None,
                commitment: candidate.as_ref().map(ChannelKey::commitment),
            });
        let already_member = channel.members.contains(peer_id);
        let mut verified = None;

        if let Some(commitment) = channel.commitment {
            match candidate {
                Some(key) if commitment.verify(&key) => {
                    verified = Some(key.clone());
                    channel.key = Some(key);
                }
                Some(_) => {
                    state.log(format!("Incorrect password for {}", name));
                    return Err(ChannelError::AuthenticationFailure(name.to_string()));
                }
                None if already_member => {}
                None => {
                    state.log(format!("Password required for {}", name));
                    return Err(ChannelError::AuthenticationFailure(name.to_string()));
                }
            }
        }

        if let Some(channel) = state.channels.get_mut(name) {
            channel.members.insert(peer_id.to_string());
        }
        state.current = Some(name.to_string());
        if !already_member {
            state.log(format!("{} joined {}", peer_id, name));
        }
        drop(state);

        if let Some(key) = &verified {
            self.store_key(key, name);
        }
        Ok(())
    }

    /// `join` reduced to success or failure, for bridge callers
    pub fn join_channel(&self, name: &str, password: Option<&str>, peer_id: &str) -> bool {
        self.join(name, password, peer_id).is_ok()
    }

    /// Protect (or re-key) a channel. Only its creator may do this.
    pub fn set_channel_password(
        &self,
        name: &str,
        password: &str,
        peer_id: &str,
    ) -> Result<(), ChannelError> {
        if !is_valid_channel_name(name) {
            return Err(ChannelError::InvalidChannelName(name.to_string()));
        }
        // Refuse strangers before paying for key derivation
        self.state.write().owned_by(name, peer_id)?;
        let key = self.derive(password, name);

        let mut state = self.state.write();
        let channel = state.owned_by(name, peer_id)?;
        channel.commitment = Some(key.commitment());
        channel.key = Some(key.clone());
        state.log(format!("Password set for {}", name));
        drop(state);

        self.store_key(&key, name);
        Ok(())
    }

    /// Drop protection from a channel. Only its creator may do this.
    pub fn remove_channel_password(&self, name: &str, peer_id: &str) -> Result<(), ChannelError> {
        if !is_valid_channel_name(name) {
            return Err(ChannelError::InvalidChannelName(name.to_string()));
        }

        let mut state = self.state.write();
        let channel = state.owned_by(name, peer_id)?;
        channel.key = None;
        channel.commitment = None;
        state.log(format!("Password removed from {}", name));
        drop(state);

        if let Some(store) = &self.key_store {
            if let Err(e) = store.delete_key(&key_store_name(name)) {
                warn!("Failed to delete key for {}: {}", name, e);
            }
        }
        Ok(())
    }

    /// Hand ownership to `new_owner_id`. Only the current creator may do this.
    pub fn transfer_ownership(
        &self,
        name: &str,
        new_owner_id: &str,
        peer_id: &str,
    ) -> Result<(), ChannelError> {
        if !is_valid_channel_name(name) {
            return Err(ChannelError::InvalidChannelName(name.to_string()));
        }

        let mut state = self.state.write();
        let channel = state.owned_by(name, peer_id)?;
        channel.creator = Some(new_owner_id.to_string());
        state.log(format!(
            "Ownership of {} transferred to {}",
            name, new_owner_id
        ));
        Ok(())
    }

    /// Route an inbound message through channel state.
    ///
    /// Failures are recorded in the system log rather than returned.
    pub fn receive_message(&self, message: &ChatMessage) -> ReceiveOutcome {
        let Some(name) = message.channel.as_deref() else {
            return ReceiveOutcome::Ignored;
        };

        let mut state = self.state.write();
        let Some(channel) = state.channels.get(name).filter(|c| !c.members.is_empty()) else {
            debug!("Ignoring message for unjoined channel {}", name);
            return ReceiveOutcome::Ignored;
        };

        if message.is_encrypted {
            match channel.verified_key().cloned() {
                Some(key) => {
                    state.log(format!("Received encrypted message in {}", name));
                    ReceiveOutcome::Encrypted {
                        channel: name.to_string(),
                        key,
                    }
                }
                None => {
                    state.log(format!("Unable to decrypt message in {}", name));
                    ReceiveOutcome::Undecryptable {
                        channel: name.to_string(),
                    }
                }
            }
        } else {
            let current = state.current.clone().unwrap_or_else(|| name.to_string());
            state.log(format!(
                "Received message in {}: {}",
                current, message.content
            ));
            ReceiveOutcome::Plain {
                channel: name.to_string(),
            }
        }
    }

    /// Handle a slash command typed by `peer_id`.
    ///
    /// `/join <channel>` and `/j <channel>` join without a password. Returns
    /// true only for a command that ran and succeeded.
    pub fn process_command(&self, command: &str, peer_id: &str) -> bool {
        let mut parts = command.splitn(2, ' ');
        let verb = parts.next().unwrap_or_default().to_lowercase();
        match verb.as_str() {
            "/join" | "/j" => match parts.next().map(str::trim) {
                Some(channel) if !channel.is_empty() => self.join_channel(channel, None, peer_id),
                _ => false,
            },
            _ => {
                self.state
                    .write()
                    .log(format!("Unknown command: {}", command));
                false
            }
        }
    }

    /// Key for sending to or decrypting from a protected channel
    pub fn channel_key(&self, name: &str) -> Result<ChannelKey, ChannelError> {
        let state = self.state.read();
        let channel = state
            .channels
            .get(name)
            .ok_or_else(|| ChannelError::NotFound(name.to_string()))?;
        channel
            .verified_key()
            .cloned()
            .ok_or_else(|| ChannelError::AuthenticationFailure(name.to_string()))
    }

    /// Copy of the session's system messages, oldest first
    pub fn system_messages(&self) -> Vec<ChatMessage> {
        self.state.read().system_log.clone()
    }

    /// Most recently created or joined channel
    pub fn current_channel(&self) -> Option<String> {
        self.state.read().current.clone()
    }

    /// Channels with at least one member, sorted
    pub fn joined_channels(&self) -> Vec<String> {
        let state = self.state.read();
        let mut names: Vec<String> = state
            .channels
            .iter()
            .filter(|(_, c)| !c.members.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn is_member(&self, name: &str, peer_id: &str) -> bool {
        self.state
            .read()
            .channels
            .get(name)
            .is_some_and(|c| c.members.contains(peer_id))
    }

    pub fn is_password_protected(&self, name: &str) -> bool {
        self.state
            .read()
            .channels
            .get(name)
            .is_some_and(ChannelState::is_protected)
    }

    pub fn channel_info(&self, name: &str) -> Option<ChannelInfo> {
        let state = self.state.read();
        state.channels.get(name).map(|c| ChannelInfo {
            name: name.to_string(),
            creator: c.creator.clone(),
            members: c.members.iter().cloned().collect(),
            password_protected: c.is_protected(),
            commitment: c.commitment,
        })
    }

    fn derive(&self, password: &str, channel: &str) -> ChannelKey {
        self.kdf.derive_key(password, channel.as_bytes())
    }

    /// Called with the state lock released, so a store may call back in
    fn store_key(&self, key: &ChannelKey, channel: &str) {
        if let Some(store) = &self.key_store {
            if let Err(e) = store.store_key(key.as_bytes(), &key_store_name(channel)) {
                warn!("Failed to store key for {}: {}", channel, e);
            }
        }
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}
