// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! Thin capability surface over rtnetlink.
//!
//! Every method wraps its failure with the operation and the link name it
//! was working on; callers above add no further netlink context.

use futures::TryStreamExt;
use ipnet::Ipv4Net;
use nix::errno::Errno;
use rtnetlink::packet_route::link::{
    InfoBridge, InfoData, InfoKind, InfoVeth, LinkAttribute, LinkInfo, LinkMessage, LinkVfInfo,
    VfInfo, VfInfoVlan,
};
use rtnetlink::{Handle, LinkBridge, LinkMessageBuilder, LinkUnspec, LinkVeth, RouteMessageBuilder};
use std::net::{IpAddr, Ipv4Addr};
use std::os::fd::RawFd;
use tracing::{debug, warn};
use trex_net::Vid;

/// Errors which can occur while programming kernel networking state.
#[derive(Debug, thiserror::Error)]
#[must_use]
pub enum NetlinkError {
    #[error("netlink connection: {0}")]
    Connection(#[from] std::io::Error),
    #[error("link {name} not found")]
    LinkNotFound { name: String },
    #[error("{name} already exists but is not a bridge")]
    NotABridge { name: String },
    #[error("failed to {what} {name}: {source}")]
    Op {
        what: &'static str,
        name: String,
        #[source]
        source: rtnetlink::Error,
    },
}

fn op(what: &'static str, name: impl Into<String>) -> impl FnOnce(rtnetlink::Error) -> NetlinkError {
    let name = name.into();
    move |source| NetlinkError::Op { what, name, source }
}

/// True when the rtnetlink error is the given kernel errno.
fn is_errno(err: &rtnetlink::Error, errno: Errno) -> bool {
    match err {
        rtnetlink::Error::NetlinkError(msg) => msg.raw_code() == -(errno as i32),
        _ => false,
    }
}

/// Narrow netlink capability used by the bridge manager and the plumber.
#[derive(Clone)]
pub struct NetlinkOps {
    handle: Handle,
}

impl NetlinkOps {
    /// Open a netlink connection in the current network namespace and
    /// drive it on the ambient tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the netlink socket cannot be created.
    pub fn new() -> Result<Self, NetlinkError> {
        let (connection, handle, _) = rtnetlink::new_connection()?;
        tokio::spawn(connection);
        Ok(NetlinkOps { handle })
    }

    /// Fetch a link by name.  Absence is `Ok(None)`, not an error.
    async fn get_link(&self, name: &str) -> Result<Option<LinkMessage>, NetlinkError> {
        let mut response = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute();
        match response.try_next().await {
            Ok(link) => Ok(link),
            Err(err) if is_errno(&err, Errno::ENODEV) => Ok(None),
            Err(err) => Err(op("get link", name)(err)),
        }
    }

    /// Interface index of `name`, if the link exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the netlink query itself fails.
    pub async fn link_index(&self, name: &str) -> Result<Option<u32>, NetlinkError> {
        Ok(self.get_link(name).await?.map(|link| link.header.index))
    }

    /// Idempotently create a bridge and bring it up.
    ///
    /// `EEXIST` from the kernel is success; a same-named link that is not
    /// a bridge is a distinct, fatal error.  The TX queue length is left
    /// untouched: a zero-length TX queue breaks FIFO traffic shapers which
    /// use it as their default packet limit.
    ///
    /// # Errors
    ///
    /// Returns [`NetlinkError::NotABridge`] when the name is squatted, or
    /// the underlying netlink failure otherwise.
    pub async fn ensure_bridge(
        &self,
        name: &str,
        mtu: u32,
        vlan_filtering: bool,
    ) -> Result<u32, NetlinkError> {
        let mut builder = LinkBridge::new(name).mtu(mtu);
        if vlan_filtering {
            builder =
                builder.set_info_data(InfoData::Bridge(vec![InfoBridge::VlanFiltering(true)]));
        }
        let message = builder.build();
        match self.handle.link().add(message).execute().await {
            Ok(()) => debug!("created bridge {name}"),
            Err(err) if is_errno(&err, Errno::EEXIST) => {
                debug!("bridge {name} already exists");
            }
            Err(err) => return Err(op("add bridge", name)(err)),
        }

        // re-fetch to read attributes and confirm the link really is a bridge
        let link = self
            .get_link(name)
            .await?
            .ok_or_else(|| NetlinkError::LinkNotFound {
                name: name.to_string(),
            })?;
        if !is_bridge(&link) {
            return Err(NetlinkError::NotABridge {
                name: name.to_string(),
            });
        }
        self.set_up(link.header.index, name).await?;
        Ok(link.header.index)
    }

    /// Create a veth pair, both ends down and unassigned.
    ///
    /// Links already holding either name are deleted first; they are
    /// residue from a crashed prior run.  Returns `(host, peer)` indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion of residue or creation fails.
    pub async fn create_veth_pair(
        &self,
        host: &str,
        peer: &str,
        mtu: u32,
    ) -> Result<(u32, u32), NetlinkError> {
        for stale in [host, peer] {
            if let Some(link) = self.get_link(stale).await? {
                warn!("deleting stale link {stale} before veth creation");
                self.handle
                    .link()
                    .del(link.header.index)
                    .execute()
                    .await
                    .map_err(op("delete stale link", stale))?;
            }
        }

        let peer_message = LinkMessageBuilder::<LinkVeth>::new_with_info_kind(InfoKind::Veth)
            .name(peer.to_string())
            .mtu(mtu)
            .build();
        let message = LinkMessageBuilder::<LinkVeth>::new_with_info_kind(InfoKind::Veth)
            .name(host.to_string())
            .mtu(mtu)
            .set_info_data(InfoData::Veth(InfoVeth::Peer(peer_message)))
            .build();
        self.handle
            .link()
            .add(message)
            .execute()
            .await
            .map_err(op("create veth pair", host))?;

        let host_index = self
            .link_index(host)
            .await?
            .ok_or_else(|| NetlinkError::LinkNotFound {
                name: host.to_string(),
            })?;
        let peer_index = self
            .link_index(peer)
            .await?
            .ok_or_else(|| NetlinkError::LinkNotFound {
                name: peer.to_string(),
            })?;
        Ok((host_index, peer_index))
    }

    /// Enslave a link to a bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the netlink set fails.
    pub async fn attach_to_bridge(
        &self,
        index: u32,
        name: &str,
        bridge_index: u32,
    ) -> Result<(), NetlinkError> {
        self.handle
            .link()
            .set(
                LinkUnspec::new_with_index(index)
                    .controller(bridge_index)
                    .build(),
            )
            .execute()
            .await
            .map_err(op("attach to bridge", name))
    }

    /// Set a link administratively up.
    ///
    /// # Errors
    ///
    /// Returns an error if the netlink set fails.
    pub async fn set_up(&self, index: u32, name: &str) -> Result<(), NetlinkError> {
        self.handle
            .link()
            .set(LinkUnspec::new_with_index(index).up().build())
            .execute()
            .await
            .map_err(op("set up", name))
    }

    /// Move a link into the network namespace referenced by `fd`.
    ///
    /// # Errors
    ///
    /// Returns an error if the netlink set fails.
    pub async fn set_ns_fd(&self, index: u32, name: &str, fd: RawFd) -> Result<(), NetlinkError> {
        self.handle
            .link()
            .set(LinkUnspec::new_with_index(index).setns_by_fd(fd).build())
            .execute()
            .await
            .map_err(op("move to netns", name))
    }

    /// Rename a link.  The link must be down.
    ///
    /// # Errors
    ///
    /// Returns an error if the netlink set fails.
    pub async fn rename(&self, index: u32, name: &str, new_name: &str) -> Result<(), NetlinkError> {
        self.handle
            .link()
            .set(
                LinkUnspec::new_with_index(index)
                    .name(new_name.to_string())
                    .build(),
            )
            .execute()
            .await
            .map_err(op("rename", name))
    }

    /// Assign an IPv4 address (with prefix) to a link.
    ///
    /// # Errors
    ///
    /// Returns an error if the netlink add fails.
    pub async fn assign_addr(
        &self,
        index: u32,
        name: &str,
        addr: Ipv4Net,
    ) -> Result<(), NetlinkError> {
        self.handle
            .address()
            .add(index, IpAddr::V4(addr.addr()), addr.prefix_len())
            .execute()
            .await
            .map_err(op("assign address to", name))
    }

    /// Install a default route via `gateway` in the current namespace.
    ///
    /// `EEXIST` is success.  `ENETUNREACH` is demoted to a warning: at
    /// early namespace-setup time the gateway is routinely not yet
    /// reachable and the route can be installed later by the operator.
    ///
    /// # Errors
    ///
    /// Returns an error for any other netlink failure.
    pub async fn add_default_route(&self, gateway: Ipv4Addr) -> Result<(), NetlinkError> {
        let route = RouteMessageBuilder::<Ipv4Addr>::new()
            .gateway(gateway)
            .build();
        match self.handle.route().add(route).execute().await {
            Ok(()) => Ok(()),
            Err(err) if is_errno(&err, Errno::EEXIST) => Ok(()),
            Err(err) if is_errno(&err, Errno::ENETUNREACH) => {
                warn!("network unreachable when adding default route via {gateway}, continuing");
                Ok(())
            }
            Err(err) => Err(op("add default route via", gateway.to_string())(err)),
        }
    }

    /// Program the VLAN of VF `vf_index` in the parent link's VF table.
    ///
    /// This runs in the host namespace against the parent (PF) link; the
    /// VF itself is never touched directly.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent link is absent or the set fails.
    pub async fn set_vf_vlan(
        &self,
        parent: &str,
        vf_index: u32,
        vlan: Vid,
    ) -> Result<(), NetlinkError> {
        let parent_index =
            self.link_index(parent)
                .await?
                .ok_or_else(|| NetlinkError::LinkNotFound {
                    name: parent.to_string(),
                })?;
        let mut message = LinkUnspec::new_with_index(parent_index).build();
        message
            .attributes
            .push(LinkAttribute::VfInfoList(vec![LinkVfInfo(vec![
                VfInfo::Vlan(VfInfoVlan::new(vf_index, u32::from(vlan.to_u16()), 0)),
            ])]));
        match self.handle.link().set(message).execute().await {
            Ok(()) => {
                debug!("set VF {parent}v{vf_index} VLAN id {vlan}");
                Ok(())
            }
            Err(err) if is_errno(&err, Errno::EEXIST) => Ok(()),
            Err(err) => Err(op("set VF VLAN on", parent)(err)),
        }
    }

    /// Delete a link by name.  A link that is already gone is success.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or deletion fails.
    pub async fn delete_link_by_name(&self, name: &str) -> Result<(), NetlinkError> {
        match self.get_link(name).await? {
            Some(link) => self
                .handle
                .link()
                .del(link.header.index)
                .execute()
                .await
                .map_err(op("delete link", name)),
            None => {
                debug!("link {name} already absent");
                Ok(())
            }
        }
    }
}

fn is_bridge(link: &LinkMessage) -> bool {
    link.attributes.iter().any(|attr| match attr {
        LinkAttribute::LinkInfo(infos) => infos
            .iter()
            .any(|info| matches!(info, LinkInfo::Kind(InfoKind::Bridge))),
        _ => false,
    })
}
