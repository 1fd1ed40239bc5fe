// blemesh core: message layer for a BLE broadcast mesh
//
// Framing, fragmentation, chat payloads, channels, delivery tracking and
// duplicate suppression. The radio, the channel content cipher and the host
// bridge plug in from outside.

pub mod channel;
pub mod config;
pub mod delivery;
pub mod filter;
pub mod message;
pub mod privacy;
pub mod protocol;
pub mod store;
pub mod transport;

use ed25519_dalek::{SigningKey, VerifyingKey};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use channel::{
    ChannelCipher, ChannelError, ChannelKey, ChannelManager, CipherError, KeyDerivation,
    Pbkdf2KeyDerivation, ReceiveOutcome,
};
pub use config::{CoreSettings, SettingsError};
pub use delivery::DeliveryTracker;
pub use filter::{BloomFilter, FilterError};
pub use message::{ChatMessage, DeliveryAck, DeliveryStatus, MessageCodec, MessageError, ReadReceipt};
pub use protocol::{Packet, PacketType, PeerId, WireCodec, WireError};
pub use store::{FavoritesStore, SecureKeyStore, StorageBackend, StoreError};
pub use transport::{Transport, TransportError};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Error taxonomy surfaced to bridge callers
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Resource exhausted: {0}")]
    ResourceExhaustion(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("No channel cipher configured")]
    CipherUnavailable,
}

impl From<WireError> for MeshError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::ReassemblyOverflow(_) => MeshError::ResourceExhaustion(err.to_string()),
            WireError::MissingSignature | WireError::BadSignature => {
                MeshError::AuthenticationFailure(err.to_string())
            }
            _ => MeshError::InvalidInput(err.to_string()),
        }
    }
}

impl From<MessageError> for MeshError {
    fn from(err: MessageError) -> Self {
        MeshError::InvalidInput(err.to_string())
    }
}

impl From<ChannelError> for MeshError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::InvalidChannelName(_) => MeshError::InvalidInput(err.to_string()),
            ChannelError::Unauthorized { .. } => MeshError::Unauthorized,
            ChannelError::AuthenticationFailure(_) => {
                MeshError::AuthenticationFailure(err.to_string())
            }
            ChannelError::NotFound(name) => MeshError::NotFound(name),
        }
    }
}

impl From<CipherError> for MeshError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::Encrypt(_) => MeshError::InvalidInput(err.to_string()),
            CipherError::Decrypt(_) => MeshError::AuthenticationFailure(err.to_string()),
        }
    }
}

impl From<FilterError> for MeshError {
    fn from(err: FilterError) -> Self {
        MeshError::InvalidInput(err.to_string())
    }
}

impl From<SettingsError> for MeshError {
    fn from(err: SettingsError) -> Self {
        MeshError::InvalidInput(err.to_string())
    }
}

impl From<StoreError> for MeshError {
    fn from(err: StoreError) -> Self {
        MeshError::Storage(err.to_string())
    }
}

impl From<TransportError> for MeshError {
    fn from(err: TransportError) -> Self {
        MeshError::Transport(err.to_string())
    }
}

pub(crate) fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ============================================================================
// CORE DELEGATE TRAIT
// ============================================================================

/// Callback interface for host events
pub trait CoreDelegate: Send + Sync {
    /// A chat message arrived and passed duplicate suppression
    fn on_message_received(&self, message: ChatMessage);
    /// A peer became visible
    fn on_peer_connected(&self, peer_id: String);
    /// A peer went away
    fn on_peer_disconnected(&self, peer_id: String);
    /// An ack arrived for a tracked message
    fn on_delivery_ack(&self, ack: DeliveryAck);
    /// A read receipt arrived for a tracked message
    fn on_read_receipt(&self, receipt: ReadReceipt);
    /// A tracked message changed status
    fn on_delivery_status_update(&self, message_id: String, status: DeliveryStatus);
}

// ============================================================================
// MESH CORE
// ============================================================================

pub struct MeshCore {
    local_peer: PeerId,
    nickname: String,
    settings: CoreSettings,
    wire: WireCodec,
    messages: MessageCodec,
    channels: ChannelManager,
    delivery: DeliveryTracker,
    /// Identities of packets already handled
    seen: Mutex<BloomFilter>,
    /// Peers reported by the last scan or connect notification
    peers: Mutex<HashSet<PeerId>>,
    peer_keys: RwLock<HashMap<PeerId, VerifyingKey>>,
    transport: Arc<dyn Transport>,
    favorites: Option<Arc<dyn FavoritesStore>>,
    cipher: Option<Arc<dyn ChannelCipher>>,
    signing_key: Option<SigningKey>,
    delegate: RwLock<Option<Arc<dyn CoreDelegate>>>,
}

impl MeshCore {
    /// Create a core with default settings.
    ///
    /// `local_peer` is zero-padded or truncated to 8 bytes.
    pub fn new(local_peer: &[u8], transport: Arc<dyn Transport>) -> Result<Self, MeshError> {
        Self::with_settings(local_peer, transport, CoreSettings::default())
    }

    pub fn with_settings(
        local_peer: &[u8],
        transport: Arc<dyn Transport>,
        settings: CoreSettings,
    ) -> Result<Self, MeshError> {
        // Initialize tracing (idempotent)
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .try_init();

        settings.validate()?;

        let local_peer = PeerId::from_slice(local_peer);
        let wire = WireCodec::with_config(settings.wire_config())?;
        let messages = MessageCodec::new(settings.message_block_size)?;
        let seen = BloomFilter::new(
            settings.bloom_expected_insertions,
            settings.bloom_false_positive_rate,
        )?;
        let kdf = Arc::new(Pbkdf2KeyDerivation::with_iterations(settings.pbkdf2_iterations));

        info!("Mesh core created for {}", local_peer);
        Ok(Self {
            local_peer,
            nickname: local_peer.to_string(),
            settings,
            wire,
            messages,
            channels: ChannelManager::with_key_derivation(kdf),
            delivery: DeliveryTracker::new(),
            seen: Mutex::new(seen),
            peers: Mutex::new(HashSet::new()),
            peer_keys: RwLock::new(HashMap::new()),
            transport,
            favorites: None,
            cipher: None,
            signing_key: None,
            delegate: RwLock::new(None),
        })
    }

    /// Display name attached to outgoing messages
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    pub fn with_favorites(mut self, favorites: Arc<dyn FavoritesStore>) -> Self {
        self.favorites = Some(favorites);
        self
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn ChannelCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn with_key_store(mut self, key_store: Arc<dyn SecureKeyStore>) -> Self {
        self.channels = self.channels.with_key_store(key_store);
        self
    }

    /// Sign every outgoing packet with this key
    pub fn with_signing_key(mut self, signing_key: SigningKey) -> Self {
        self.signing_key = Some(signing_key);
        self
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn settings(&self) -> &CoreSettings {
        &self.settings
    }

    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    pub fn delivery(&self) -> &DeliveryTracker {
        &self.delivery
    }

    // ------------------------------------------------------------------------
    // DELEGATE
    // ------------------------------------------------------------------------

    pub fn set_delegate(&self, delegate: Option<Box<dyn CoreDelegate>>) {
        *self.delegate.write() = delegate.map(|d| Arc::from(d) as Arc<dyn CoreDelegate>);
    }

    fn delegate(&self) -> Option<Arc<dyn CoreDelegate>> {
        self.delegate.read().clone()
    }

    // ------------------------------------------------------------------------
    // PEERS
    // ------------------------------------------------------------------------

    pub fn start_advertising(&self) -> Result<(), MeshError> {
        self.transport.start_advertising(self.local_peer)?;
        info!("Advertising as {}", self.local_peer);
        Ok(())
    }

    /// Scan for peers, reporting arrivals and departures since the last scan
    pub fn scan_peers(&self) -> Result<Vec<PeerId>, MeshError> {
        let visible = self.transport.scan_peers()?;
        let current: HashSet<PeerId> = visible.iter().copied().collect();

        let (arrived, departed) = {
            let mut peers = self.peers.lock();
            let arrived: Vec<PeerId> = current.difference(&peers).copied().collect();
            let departed: Vec<PeerId> = peers.difference(&current).copied().collect();
            *peers = current;
            (arrived, departed)
        };

        if let Some(delegate) = self.delegate() {
            for peer in arrived {
                delegate.on_peer_connected(peer.to_string());
            }
            for peer in departed {
                delegate.on_peer_disconnected(peer.to_string());
            }
        }
        Ok(visible)
    }

    /// Host-reported connection. Repeats are not re-announced.
    pub fn notify_peer_connected(&self, peer: PeerId) {
        if !self.peers.lock().insert(peer) {
            return;
        }
        debug!("Peer connected: {}", peer);
        if let Some(delegate) = self.delegate() {
            delegate.on_peer_connected(peer.to_string());
        }
    }

    /// Host-reported disconnection. Unknown peers are ignored.
    pub fn notify_peer_disconnected(&self, peer: PeerId) {
        if !self.peers.lock().remove(&peer) {
            return;
        }
        debug!("Peer disconnected: {}", peer);
        if let Some(delegate) = self.delegate() {
            delegate.on_peer_disconnected(peer.to_string());
        }
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.peers.lock().iter().copied().collect();
        peers.sort();
        peers
    }

    /// Check signatures on packets from `peer` from now on
    pub fn register_peer_key(&self, peer: PeerId, key: VerifyingKey) {
        self.peer_keys.write().insert(peer, key);
    }

    pub fn is_favorite(&self, fingerprint: &str) -> Result<bool, MeshError> {
        if fingerprint.is_empty() {
            return Err(MeshError::InvalidInput("empty fingerprint".to_string()));
        }
        Ok(self
            .favorites
            .as_ref()
            .is_some_and(|favorites| favorites.is_favorite(fingerprint)))
    }

    // ------------------------------------------------------------------------
    // OUTBOUND
    // ------------------------------------------------------------------------

    /// Broadcast a text message, or address it to one peer.
    ///
    /// The returned message is tracked as PENDING under its id.
    pub fn send_message(
        &self,
        content: &str,
        recipient: Option<PeerId>,
    ) -> Result<ChatMessage, MeshError> {
        let mut message = ChatMessage::text(&self.nickname, self.local_peer.to_string(), content);
        message.is_private = recipient.is_some();
        self.transmit(&message, PacketType::Data, recipient)?;
        Ok(message)
    }

    /// Post plaintext to a channel the local peer has joined
    pub fn send_channel_message(&self, channel: &str, content: &str) -> Result<ChatMessage, MeshError> {
        self.require_membership(channel)?;
        let mut message = ChatMessage::text(&self.nickname, self.local_peer.to_string(), content)
            .in_channel(channel);
        message.recipient_nickname = Some(channel.to_string());
        self.transmit(&message, PacketType::Data, None)?;
        Ok(message)
    }

    /// Encrypt `content` with the channel key and broadcast it.
    ///
    /// The ciphertext travels hex-encoded in the content field, with the
    /// channel name in the recipient nickname field.
    pub fn send_encrypted_channel_message(
        &self,
        channel: &str,
        content: &str,
    ) -> Result<ChatMessage, MeshError> {
        let cipher = self.cipher.as_ref().ok_or(MeshError::CipherUnavailable)?;
        self.require_membership(channel)?;
        let key = self.channels.channel_key(channel)?;
        let ciphertext = cipher.encrypt(&key, content.as_bytes())?;

        let message = ChatMessage::text(&self.nickname, self.local_peer.to_string(), content)
            .in_channel(channel)
            .with_ciphertext(ciphertext.clone());

        let mut wire_message = message.clone();
        wire_message.content = hex::encode(&ciphertext);
        wire_message.recipient_nickname = Some(channel.to_string());
        self.transmit(&wire_message, PacketType::EncryptedChannel, None)?;
        Ok(message)
    }

    /// Decrypt channel ciphertext with the locally held, commitment-verified key
    pub fn decrypt_channel_message(&self, channel: &str, ciphertext: &[u8]) -> Result<String, MeshError> {
        let cipher = self.cipher.as_ref().ok_or(MeshError::CipherUnavailable)?;
        let key = self.channels.channel_key(channel)?;
        let plaintext = cipher.decrypt(&key, ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|_| MeshError::InvalidInput("decrypted content is not UTF-8".to_string()))
    }

    fn require_membership(&self, channel: &str) -> Result<(), MeshError> {
        if self.channels.is_member(channel, &self.local_peer.to_string()) {
            Ok(())
        } else {
            Err(MeshError::NotFound(format!("not a member of {}", channel)))
        }
    }

    fn transmit(
        &self,
        message: &ChatMessage,
        packet_type: PacketType,
        recipient: Option<PeerId>,
    ) -> Result<(), MeshError> {
        let payload = self.messages.encode(message)?;
        let mut packet = Packet::new(
            packet_type,
            self.local_peer,
            recipient.unwrap_or(PeerId::BROADCAST),
            payload,
        )
        .with_ttl(self.settings.default_ttl);
        if let Some(key) = &self.signing_key {
            packet.sign(key);
        }

        let frames = self.wire.encode(&packet)?;
        // Our own packet echoing back through relays is a duplicate
        self.seen.lock().insert(packet.identity());

        for frame in &frames {
            self.transport.send_frame(frame)?;
        }
        self.delivery
            .track(&message.id.to_string(), DeliveryStatus::Pending);
        debug!(
            "Sent message {} in {} frame(s), {} payload bytes",
            message.id,
            frames.len(),
            packet.payload.len()
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // INBOUND
    // ------------------------------------------------------------------------

    /// Feed one frame from the radio.
    ///
    /// Returns the message once a complete, previously unseen packet
    /// addressed to this node (or broadcast) has been decoded. Fragments,
    /// duplicates, foreign unicast and messages for unjoined channels yield
    /// `None`.
    pub fn on_frame_received(&self, frame: &[u8]) -> Result<Option<ChatMessage>, MeshError> {
        let packet = match self.wire.decode(frame) {
            Ok(Some(packet)) => packet,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Rejected frame ({} bytes): {}", frame.len(), e);
                return Err(e.into());
            }
        };

        if !packet.is_broadcast() && packet.recipient_id != self.local_peer {
            debug!("Packet for {} is not ours", packet.recipient_id);
            return Ok(None);
        }

        if let Some(key) = self.peer_keys.read().get(&packet.sender_id) {
            packet.verify(key)?;
        }

        let identity = packet.identity();
        if self.seen.lock().might_contain(&identity) {
            debug!("Dropping duplicate packet from {}", packet.sender_id);
            return Ok(None);
        }

        // A packet counts as seen only once its payload has decoded
        let mut message = self.messages.decode(&packet.payload)?;
        let channel = message
            .recipient_nickname
            .as_deref()
            .filter(|name| !message.is_private && channel::is_valid_channel_name(name))
            .map(str::to_string);
        if let Some(channel) = &channel {
            message.channel = Some(channel.clone());
            if message.is_encrypted {
                let ciphertext = hex::decode(&message.content).map_err(|_| {
                    MeshError::InvalidInput("channel ciphertext is not hex".to_string())
                })?;
                message.content.clear();
                message.encrypted_content = Some(ciphertext);
            }
        }

        {
            let mut seen = self.seen.lock();
            if seen.might_contain(&identity) {
                debug!("Dropping duplicate packet from {}", packet.sender_id);
                return Ok(None);
            }
            seen.insert(identity);
        }

        if channel.is_some() {
            match self.channels.receive_message(&message) {
                ReceiveOutcome::Ignored => return Ok(None),
                ReceiveOutcome::Encrypted { key, .. } => self.try_decrypt(&mut message, &key),
                ReceiveOutcome::Plain { .. } | ReceiveOutcome::Undecryptable { .. } => {}
            }
        }

        if let Some(delegate) = self.delegate() {
            delegate.on_message_received(message.clone());
        }
        Ok(Some(message))
    }

    fn try_decrypt(&self, message: &mut ChatMessage, key: &ChannelKey) {
        let (Some(cipher), Some(ciphertext)) = (&self.cipher, &message.encrypted_content) else {
            return;
        };
        match cipher.decrypt(key, ciphertext) {
            Ok(plaintext) => match String::from_utf8(plaintext) {
                Ok(content) => message.content = content,
                Err(_) => warn!("Decrypted channel content is not UTF-8"),
            },
            Err(e) => warn!("Channel decryption failed: {}", e),
        }
    }

    /// Drop partial packets that stopped receiving fragments
    pub fn purge_expired_fragments(&self) -> usize {
        self.wire.purge_expired()
    }

    pub fn pending_fragments(&self) -> usize {
        self.wire.pending_fragments()
    }

    // ------------------------------------------------------------------------
    // DELIVERY
    // ------------------------------------------------------------------------

    /// Build an ack for a message this node received
    pub fn acknowledge(&self, message_id: &str, hop_count: u32) -> DeliveryAck {
        self.delivery.generate_ack(
            message_id,
            &self.local_peer.to_string(),
            &self.nickname,
            hop_count,
        )
    }

    /// Build a read receipt for a message this node received
    pub fn read_receipt(&self, message_id: &str) -> ReadReceipt {
        ReadReceipt::new(message_id, self.local_peer.to_string())
    }

    /// Record an ack for one of our messages
    pub fn handle_ack(&self, ack: &DeliveryAck) {
        if !self.delivery.is_tracked(&ack.message_id) {
            debug!("Ignoring ack for unknown message {}", ack.message_id);
            return;
        }
        let changed = self.delivery.process_ack(ack);

        if let Some(delegate) = self.delegate() {
            delegate.on_delivery_ack(ack.clone());
            if let Some(status) = changed {
                delegate.on_delivery_status_update(ack.message_id.clone(), status);
            }
        }
    }

    /// Record a read receipt for one of our messages
    pub fn handle_read_receipt(&self, receipt: &ReadReceipt) {
        if !self.delivery.process_read_receipt(receipt) {
            return;
        }
        if let Some(delegate) = self.delegate() {
            delegate.on_read_receipt(receipt.clone());
            delegate.on_delivery_status_update(receipt.message_id.clone(), DeliveryStatus::Read);
        }
    }

    pub fn delivery_status(&self, message_id: &str) -> DeliveryStatus {
        self.delivery.get_status(message_id)
    }

    pub fn delivery_acks(&self, message_id: &str) -> Vec<DeliveryAck> {
        self.delivery.get_acks(message_id)
    }

    // ------------------------------------------------------------------------
    // CHANNELS (acting as the local peer)
    // ------------------------------------------------------------------------

    pub fn create_channel(&self, name: &str, password: Option<&str>) -> Result<(), MeshError> {
        Ok(self
            .channels
            .create_channel(name, password, &self.local_peer.to_string())?)
    }

    pub fn join_channel(&self, name: &str, password: Option<&str>) -> bool {
        self.channels
            .join_channel(name, password, &self.local_peer.to_string())
    }

    pub fn set_channel_password(&self, name: &str, password: &str) -> Result<(), MeshError> {
        Ok(self
            .channels
            .set_channel_password(name, password, &self.local_peer.to_string())?)
    }

    pub fn remove_channel_password(&self, name: &str) -> Result<(), MeshError> {
        Ok(self
            .channels
            .remove_channel_password(name, &self.local_peer.to_string())?)
    }

    pub fn transfer_channel_ownership(&self, name: &str, new_owner: &str) -> Result<(), MeshError> {
        Ok(self
            .channels
            .transfer_ownership(name, new_owner, &self.local_peer.to_string())?)
    }

    pub fn process_command(&self, command: &str) -> bool {
        self.channels
            .process_command(command, &self.local_peer.to_string())
    }

    pub fn system_messages(&self) -> Vec<ChatMessage> {
        self.channels.system_messages()
    }

    pub fn current_channel(&self) -> Option<String> {
        self.channels.current_channel()
    }
}

// ============================================================================
// TESTS
// ============================================================================
