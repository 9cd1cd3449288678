//! Dropping root privileges once the listen socket is bound.

use std::ffi::CString;
use std::io;

/// Looks up `user` and changes the process's user id to theirs.
///
/// Runs after binding (port 70 needs root) and before the accept loop
/// spawns, so requests are never served with elevated privileges.
pub fn drop_to_user(user: &str) -> io::Result<()> {
    let name = CString::new(user).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

    // getpwnam hands back a pointer into static storage; it is read here
    // once, before any worker threads exist.
    let passwd = unsafe { libc::getpwnam(name.as_ptr()) };
    if passwd.is_null() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("unknown user {user:?}"),
        ));
    }
    let uid = unsafe { (*passwd).pw_uid };

    if unsafe { libc::setuid(uid) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
