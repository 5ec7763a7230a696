// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

use std::io;

use libc;

/// Resolves the local hostname, falling back to a fixed default so records
/// always carry a producer identity
pub fn hostname() -> String {
  match resolve_hostname() {
    Ok(name) => name,
    Err(e) => {
      warn!("hostname resolve failed, using default: {}", e);
      "defaultHost".to_string()
    }
  }
}

fn resolve_hostname() -> io::Result<String> {
  // HOST_NAME_MAX is 64 on linux; leave headroom for other platforms
  let mut buf = vec![0u8; 256];

  let rc = unsafe {
    libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len())
  };

  if rc != 0 {
    return Err(io::Error::last_os_error());
  }

  let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());

  Ok(String::from_utf8_lossy(&buf[..end]).to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hostname_never_empty() {
    assert!(!hostname().is_empty());
  }
}
