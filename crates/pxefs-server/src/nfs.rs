//! NFSv3 binding of the [`Namespace`].
//!
//! [`NamespaceFs`] implements `nfsserve`'s filesystem trait by delegating
//! every call to the namespace. Handles are used as NFS file ids as is.

use std::io;
use std::net::SocketAddr;
use std::time::SystemTime;

use async_trait::async_trait;
use nfsserve::nfs::{
    fattr3, fileid3, filename3, ftype3, nfspath3, nfsstat3, nfsstring, nfstime3, sattr3,
    specdata3,
};
use nfsserve::tcp::{NFSTcp, NFSTcpListener};
use nfsserve::vfs::{DirEntry, NFSFileSystem, ReadDirResult, VFSCapabilities};
use pxefs_kernel::{ContentError, FileAttr, FileType, Namespace};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::constants::NFS_FSID;

/// Map a content error onto an NFS status.
pub fn nfs_status(error: &ContentError) -> nfsstat3 {
    match error {
        ContentError::NotFound(_) => nfsstat3::NFS3ERR_NOENT,
        ContentError::Unsupported(_) => nfsstat3::NFS3ERR_NOTSUPP,
        ContentError::Io(e) => match e.kind() {
            io::ErrorKind::NotADirectory => nfsstat3::NFS3ERR_NOTDIR,
            io::ErrorKind::IsADirectory => nfsstat3::NFS3ERR_ISDIR,
            io::ErrorKind::NotFound => nfsstat3::NFS3ERR_NOENT,
            _ => nfsstat3::NFS3ERR_IO,
        },
        ContentError::Configuration(_) | ContentError::Teardown(_) => nfsstat3::NFS3ERR_IO,
    }
}

fn nfs_time(time: SystemTime) -> nfstime3 {
    let since = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    nfstime3 {
        seconds: u32::try_from(since.as_secs()).unwrap_or(u32::MAX),
        nseconds: since.subsec_nanos(),
    }
}

/// Wire attributes of a namespace object. Everything is owned by root.
pub fn nfs_attr(attr: &FileAttr) -> fattr3 {
    let ftype = match attr.kind {
        FileType::File => ftype3::NF3REG,
        FileType::Directory => ftype3::NF3DIR,
    };
    fattr3 {
        ftype,
        mode: attr.perm,
        nlink: attr.nlink,
        uid: 0,
        gid: 0,
        size: attr.size,
        used: attr.size,
        rdev: specdata3 {
            specdata1: 0,
            specdata2: 0,
        },
        fsid: NFS_FSID,
        fileid: attr.handle,
        atime: nfs_time(attr.atime),
        mtime: nfs_time(attr.mtime),
        ctime: nfs_time(attr.ctime),
    }
}

fn file_name(name: &filename3) -> Result<&str, nfsstat3> {
    std::str::from_utf8(&name.0).map_err(|_| nfsstat3::NFS3ERR_NOENT)
}

fn refuse<T>(op: &str, result: Result<T, ContentError>) -> Result<T, nfsstat3> {
    result.map_err(|e| {
        debug!(op, error = %e, "refusing mutation");
        nfs_status(&e)
    })
}

/// Read-only NFS filesystem over a namespace.
#[derive(Clone)]
pub struct NamespaceFs {
    namespace: Namespace,
}

impl NamespaceFs {
    pub fn new(namespace: Namespace) -> Self {
        Self { namespace }
    }
}

#[async_trait]
impl NFSFileSystem for NamespaceFs {
    fn capabilities(&self) -> VFSCapabilities {
        VFSCapabilities::ReadOnly
    }

    fn root_dir(&self) -> fileid3 {
        self.namespace.root_handle()
    }

    async fn lookup(&self, dirid: fileid3, filename: &filename3) -> Result<fileid3, nfsstat3> {
        let name = file_name(filename)?;
        self.namespace
            .lookup(dirid, name)
            .map_err(|e| nfs_status(&e))
    }

    async fn getattr(&self, id: fileid3) -> Result<fattr3, nfsstat3> {
        self.namespace
            .getattr(id)
            .map(|attr| nfs_attr(&attr))
            .map_err(|e| nfs_status(&e))
    }

    async fn setattr(&self, id: fileid3, _setattr: sattr3) -> Result<fattr3, nfsstat3> {
        refuse("setattr", self.namespace.setattr(id)).map(|attr| nfs_attr(&attr))
    }

    async fn read(
        &self,
        id: fileid3,
        offset: u64,
        count: u32,
    ) -> Result<(Vec<u8>, bool), nfsstat3> {
        self.namespace
            .read(id, offset, count as usize)
            .await
            .map_err(|e| {
                debug!(handle = %format!("{id:016x}"), offset, error = %e, "nfs read failed");
                nfs_status(&e)
            })
    }

    async fn write(&self, id: fileid3, offset: u64, data: &[u8]) -> Result<fattr3, nfsstat3> {
        refuse("write", self.namespace.write(id, offset, data)).map(|attr| nfs_attr(&attr))
    }

    async fn create(
        &self,
        dirid: fileid3,
        filename: &filename3,
        _attr: sattr3,
    ) -> Result<(fileid3, fattr3), nfsstat3> {
        let attr = refuse("create", self.namespace.create(dirid, file_name(filename)?))?;
        Ok((attr.handle, nfs_attr(&attr)))
    }

    async fn create_exclusive(
        &self,
        dirid: fileid3,
        filename: &filename3,
    ) -> Result<fileid3, nfsstat3> {
        let attr = refuse("create", self.namespace.create(dirid, file_name(filename)?))?;
        Ok(attr.handle)
    }

    async fn mkdir(
        &self,
        dirid: fileid3,
        dirname: &filename3,
    ) -> Result<(fileid3, fattr3), nfsstat3> {
        let attr = refuse("mkdir", self.namespace.mkdir(dirid, file_name(dirname)?))?;
        Ok((attr.handle, nfs_attr(&attr)))
    }

    async fn remove(&self, dirid: fileid3, filename: &filename3) -> Result<(), nfsstat3> {
        refuse("remove", self.namespace.remove(dirid, file_name(filename)?))
    }

    async fn rename(
        &self,
        from_dirid: fileid3,
        from_filename: &filename3,
        to_dirid: fileid3,
        to_filename: &filename3,
    ) -> Result<(), nfsstat3> {
        refuse(
            "rename",
            self.namespace.rename(
                from_dirid,
                file_name(from_filename)?,
                to_dirid,
                file_name(to_filename)?,
            ),
        )
    }

    async fn readdir(
        &self,
        dirid: fileid3,
        start_after: fileid3,
        max_entries: usize,
    ) -> Result<ReadDirResult, nfsstat3> {
        let page = self
            .namespace
            .read_dir(dirid, start_after, max_entries)
            .map_err(|e| nfs_status(&e))?;
        let entries = page
            .entries
            .into_iter()
            .map(|entry| DirEntry {
                fileid: entry.handle,
                name: nfsstring(entry.name.into_bytes()),
                attr: nfs_attr(&entry.attr),
            })
            .collect();
        Ok(ReadDirResult {
            entries,
            end: page.end,
        })
    }

    async fn symlink(
        &self,
        dirid: fileid3,
        linkname: &filename3,
        symlink: &nfspath3,
        _attr: &sattr3,
    ) -> Result<(fileid3, fattr3), nfsstat3> {
        let target = String::from_utf8_lossy(&symlink.0);
        let attr = refuse(
            "symlink",
            self.namespace.symlink(dirid, file_name(linkname)?, &target),
        )?;
        Ok((attr.handle, nfs_attr(&attr)))
    }

    async fn readlink(&self, _id: fileid3) -> Result<nfspath3, nfsstat3> {
        // No object in the namespace is a symlink.
        Err(nfsstat3::NFS3ERR_INVAL)
    }
}

/// Serve `namespace` over NFSv3 until `cancel` fires.
pub async fn serve(
    addr: SocketAddr,
    namespace: Namespace,
    cancel: CancellationToken,
) -> io::Result<()> {
    let listener = NFSTcpListener::bind(&addr.to_string(), NamespaceFs::new(namespace)).await?;
    info!(addr = %addr, port = listener.get_listen_port(), "nfs server listening");

    tokio::select! {
        _ = cancel.cancelled() => {
            info!("nfs server stopped");
            Ok(())
        }
        result = listener.handle_forever() => result,
    }
}
