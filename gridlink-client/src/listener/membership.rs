//! Cluster members and membership change events.

use std::collections::HashMap;
use std::net::SocketAddr;

use gridlink_core::protocol::MemberInfo;
use uuid::Uuid;

/// Type of membership event fired when cluster topology changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MemberEventType {
    /// A new member joined the cluster.
    Added = 1,
    /// A member left the cluster.
    Removed = 2,
}

impl MemberEventType {
    /// Creates an event type from its wire format value.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Added),
            2 => Some(Self::Removed),
            _ => None,
        }
    }

    /// Returns the wire format value for this event type.
    pub fn value(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for MemberEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "ADDED"),
            Self::Removed => write!(f, "REMOVED"),
        }
    }
}

/// A member of the cluster.
///
/// Members are immutable; a changed member arrives as a new value in the
/// next membership view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    uuid: Uuid,
    address: SocketAddr,
    version: i32,
    attributes: HashMap<String, String>,
    lite_member: bool,
}

impl Member {
    /// Creates a data member without attributes.
    pub fn new(uuid: Uuid, address: SocketAddr) -> Self {
        Self {
            uuid,
            address,
            version: 0,
            attributes: HashMap::new(),
            lite_member: false,
        }
    }

    /// Sets the member-list version at which the member joined.
    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Sets a custom attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Marks the member as lite (holds no partitions).
    pub fn lite(mut self) -> Self {
        self.lite_member = true;
        self
    }

    /// Returns the member's UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the member's network address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns the member-list version at which the member joined.
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Returns the member's attributes.
    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    /// Returns whether this is a lite member.
    pub fn is_lite_member(&self) -> bool {
        self.lite_member
    }
}

impl From<MemberInfo> for Member {
    fn from(info: MemberInfo) -> Self {
        Self {
            uuid: info.uuid,
            address: info.address,
            version: info.version,
            attributes: info.attributes,
            lite_member: info.lite_member,
        }
    }
}

impl From<&Member> for MemberInfo {
    fn from(member: &Member) -> Self {
        MemberInfo {
            uuid: member.uuid,
            address: member.address,
            version: member.version,
            attributes: member.attributes.clone(),
            lite_member: member.lite_member,
        }
    }
}

impl std::fmt::Display for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Member[uuid={}, address={}]", self.uuid, self.address)
    }
}

/// An event fired when a cluster member joins or leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEvent {
    /// The member that triggered the event.
    pub member: Member,
    /// The type of membership change.
    pub event_type: MemberEventType,
}

impl MemberEvent {
    /// Creates a new membership event.
    pub fn new(member: Member, event_type: MemberEventType) -> Self {
        Self { member, event_type }
    }

    /// Creates an event for a member that joined the cluster.
    pub fn member_added(member: Member) -> Self {
        Self::new(member, MemberEventType::Added)
    }

    /// Creates an event for a member that left the cluster.
    pub fn member_removed(member: Member) -> Self {
        Self::new(member, MemberEventType::Removed)
    }
}

impl std::fmt::Display for MemberEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemberEvent[{} {}]", self.member, self.event_type)
    }
}
