//! Channel subscription and presence registry shared by every transport.
//!
//! The registry is pure state: it never sends anything. Mutations return
//! the notifications the caller must deliver (`Joined` / `Left`), computed
//! from a snapshot taken inside the mutation, so delivery can happen after
//! the registry lock is released without observing a half-applied change.
//!
//! # Invariants
//!
//! - A channel with no subscribers has no entry (`channels()` lists only
//!   channels with at least one subscriber).
//! - A presence member exists only while its connection is subscribed to
//!   that presence channel.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use super::event::{is_presence_channel, PresenceMember};

/// Outcome of a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Joined<Id> {
    pub channel: String,
    /// Members already present before this join; `Some` only for presence channels.
    pub members: Option<Vec<PresenceMember>>,
    /// Member info to announce as `member_added`, if one was declared.
    pub member_added: Option<PresenceMember>,
    /// Other subscribers of the channel at the time of the join.
    pub peers: Vec<Id>,
}

/// Outcome of an unsubscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Left<Id> {
    pub channel: String,
    /// Member info to announce as `member_removed`, if an entry existed.
    pub member_removed: Option<PresenceMember>,
    /// Subscribers remaining on the channel.
    pub peers: Vec<Id>,
}

/// Maps channel names to subscribers and presence channels to members.
#[derive(Debug, Clone)]
pub struct ChannelRegistry<Id> {
    channels: HashMap<String, HashSet<Id>>,
    /// Join-ordered member list per presence channel.
    presence: HashMap<String, Vec<(Id, PresenceMember)>>,
    /// Reverse index: connection → channels, for O(channels) cleanup.
    memberships: HashMap<Id, HashSet<String>>,
}

impl<Id> Default for ChannelRegistry<Id> {
    fn default() -> Self {
        Self {
            channels: HashMap::new(),
            presence: HashMap::new(),
            memberships: HashMap::new(),
        }
    }
}

impl<Id> ChannelRegistry<Id>
where
    Id: Clone + Eq + Hash,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `id` to `channel`.
    ///
    /// On a presence channel, `member` adds (or replaces) the connection's
    /// member entry. Re-subscribing is allowed and refreshes member info.
    pub fn subscribe(
        &mut self,
        id: &Id,
        channel: &str,
        member: Option<PresenceMember>,
    ) -> Joined<Id> {
        let subscribers = self.channels.entry(channel.to_string()).or_default();
        let peers: Vec<Id> = subscribers.iter().filter(|s| *s != id).cloned().collect();
        subscribers.insert(id.clone());

        self.memberships
            .entry(id.clone())
            .or_default()
            .insert(channel.to_string());

        if !is_presence_channel(channel) {
            return Joined {
                channel: channel.to_string(),
                members: None,
                member_added: None,
                peers,
            };
        }

        let entries = self.presence.entry(channel.to_string()).or_default();
        let members: Vec<PresenceMember> = entries
            .iter()
            .filter(|(owner, _)| owner != id)
            .map(|(_, m)| m.clone())
            .collect();

        let member_added = member.map(|m| {
            match entries.iter_mut().find(|(owner, _)| owner == id) {
                Some(slot) => slot.1 = m.clone(),
                None => entries.push((id.clone(), m.clone())),
            }
            m
        });

        if entries.is_empty() {
            self.presence.remove(channel);
        }

        Joined {
            channel: channel.to_string(),
            members: Some(members),
            member_added,
            peers,
        }
    }

    /// Unsubscribe `id` from `channel`.
    ///
    /// Returns `None` when `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: &Id, channel: &str) -> Option<Left<Id>> {
        let subscribers = self.channels.get_mut(channel)?;
        if !subscribers.remove(id) {
            return None;
        }
        let peers: Vec<Id> = subscribers.iter().cloned().collect();
        if peers.is_empty() {
            self.channels.remove(channel);
        }

        if let Some(joined) = self.memberships.get_mut(id) {
            joined.remove(channel);
            if joined.is_empty() {
                self.memberships.remove(id);
            }
        }

        let member_removed = match self.presence.get_mut(channel) {
            Some(entries) => {
                let removed = entries
                    .iter()
                    .position(|(owner, _)| owner == id)
                    .map(|i| entries.remove(i).1);
                if entries.is_empty() {
                    self.presence.remove(channel);
                }
                removed
            }
            None => None,
        };

        Some(Left {
            channel: channel.to_string(),
            member_removed,
            peers,
        })
    }

    /// Unsubscribe `id` from every channel it holds.
    pub fn remove_connection(&mut self, id: &Id) -> Vec<Left<Id>> {
        let mut channels: Vec<String> = self
            .memberships
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        channels.sort();

        channels
            .iter()
            .filter_map(|channel| self.unsubscribe(id, channel))
            .collect()
    }

    /// Current subscribers of `channel` (empty if the channel is absent).
    pub fn subscribers(&self, channel: &str) -> Vec<Id> {
        self.channels
            .get(channel)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Subscribers of `channel` other than `except`.
    pub fn recipients(&self, channel: &str, except: Option<&Id>) -> Vec<Id> {
        self.channels
            .get(channel)
            .map(|set| {
                set.iter()
                    .filter(|id| Some(*id) != except)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of subscribers of `channel` (0 if absent).
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map(HashSet::len).unwrap_or(0)
    }

    /// Presence members of `channel` in join order.
    ///
    /// Empty for non-presence channels and channels without members.
    pub fn presence_members(&self, channel: &str) -> Vec<PresenceMember> {
        self.presence
            .get(channel)
            .map(|entries| entries.iter().map(|(_, m)| m.clone()).collect())
            .unwrap_or_default()
    }

    /// All channels with at least one subscriber, sorted by name.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Channels `id` is subscribed to, sorted by name.
    pub fn channels_of(&self, id: &Id) -> Vec<String> {
        let mut names: Vec<String> = self
            .memberships
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Whether `id` is subscribed to `channel`.
    pub fn is_subscribed(&self, id: &Id, channel: &str) -> bool {
        self.channels
            .get(channel)
            .map(|set| set.contains(id))
            .unwrap_or(false)
    }

    /// Drop every subscription and presence entry.
    pub fn clear(&mut self) {
        self.channels.clear();
        self.presence.clear();
        self.memberships.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
