//! Capability bit-set and its permission-letter form.
//!
//! | letter | capabilities                                         |
//! |--------|------------------------------------------------------|
//! | `r`    | stat, get path, download, list container             |
//! | `w`    | upload, plus move when `r` is present                 |
//! | `a`    | create container                                     |
//! | `d`    | delete                                               |
//! | `C`    | add grant                                            |
//! | `c`    | list grants                                          |
//! | `o`    | remove grant, update grant                           |
//! | `O`    | deny grant                                           |
//! | `u`    | list recycle                                         |
//! | `U`    | restore recycle item                                 |
//! | `P`    | purge recycle                                        |
//! | `v`    | list file versions                                   |
//! | `V`    | restore file version                                 |
//! | `q`    | get quota                                            |
//!
//! Unknown letters are ignored when decoding. `SET_QUOTA` has no letter.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Permissions: u32 {
        const STAT = 1 << 0;
        const GET_PATH = 1 << 1;
        const INITIATE_FILE_DOWNLOAD = 1 << 2;
        const LIST_CONTAINER = 1 << 3;
        const INITIATE_FILE_UPLOAD = 1 << 4;
        const MOVE = 1 << 5;
        const CREATE_CONTAINER = 1 << 6;
        const DELETE = 1 << 7;
        const ADD_GRANT = 1 << 8;
        const LIST_GRANTS = 1 << 9;
        const REMOVE_GRANT = 1 << 10;
        const UPDATE_GRANT = 1 << 11;
        const DENY_GRANT = 1 << 12;
        const LIST_RECYCLE = 1 << 13;
        const RESTORE_RECYCLE_ITEM = 1 << 14;
        const PURGE_RECYCLE = 1 << 15;
        const LIST_FILE_VERSIONS = 1 << 16;
        const RESTORE_FILE_VERSION = 1 << 17;
        const GET_QUOTA = 1 << 18;
        const SET_QUOTA = 1 << 19;
    }
}

impl Permissions {
    /// Everything granted by the `r` letter
    pub const READ_FAMILY: Permissions = Permissions::STAT
        .union(Permissions::GET_PATH)
        .union(Permissions::INITIATE_FILE_DOWNLOAD)
        .union(Permissions::LIST_CONTAINER);

    /// Capabilities that produce a `w` letter
    pub const WRITE_FAMILY: Permissions = Permissions::INITIATE_FILE_UPLOAD.union(Permissions::MOVE);

    /// Letters emitted for single capability groups, in encoding order
    const LETTERS: [(char, Permissions); 12] = [
        ('a', Permissions::CREATE_CONTAINER),
        ('d', Permissions::DELETE),
        ('C', Permissions::ADD_GRANT),
        ('c', Permissions::LIST_GRANTS),
        ('o', Permissions::REMOVE_GRANT.union(Permissions::UPDATE_GRANT)),
        ('O', Permissions::DENY_GRANT),
        ('u', Permissions::LIST_RECYCLE),
        ('U', Permissions::RESTORE_RECYCLE_ITEM),
        ('P', Permissions::PURGE_RECYCLE),
        ('v', Permissions::LIST_FILE_VERSIONS),
        ('V', Permissions::RESTORE_FILE_VERSION),
        ('q', Permissions::GET_QUOTA),
    ];

    /// Encode as permission letters. A group letter is written when any
    /// capability of the group is set.
    pub fn to_letters(self) -> String {
        let mut out = String::new();
        if self.intersects(Self::READ_FAMILY) {
            out.push('r');
        }
        if self.intersects(Self::WRITE_FAMILY) {
            out.push('w');
        }
        for (letter, caps) in Self::LETTERS {
            if self.intersects(caps) {
                out.push(letter);
            }
        }
        out
    }

    /// Decode permission letters, ignoring letters outside the vocabulary
    pub fn from_letters(letters: &str) -> Permissions {
        let mut p = Permissions::empty();
        if letters.contains('r') {
            p |= Self::READ_FAMILY;
        }
        if letters.contains('w') {
            p |= Permissions::INITIATE_FILE_UPLOAD;
            if p.contains(Permissions::INITIATE_FILE_DOWNLOAD) {
                p |= Permissions::MOVE;
            }
        }
        for (letter, caps) in Self::LETTERS {
            if letters.contains(letter) {
                p |= caps;
            }
        }
        p
    }

    /// The set the letter encoding can represent for `self`
    pub fn effective(self) -> Permissions {
        Permissions::from_letters(&self.to_letters())
    }

    /// Viewer role: read and list
    pub fn viewer() -> Permissions {
        Self::READ_FAMILY | Permissions::LIST_FILE_VERSIONS
    }

    /// Editor role: viewer plus upload, move, create, delete and trash handling
    pub fn editor() -> Permissions {
        Self::viewer()
            | Self::WRITE_FAMILY
            | Permissions::CREATE_CONTAINER
            | Permissions::DELETE
            | Permissions::LIST_RECYCLE
            | Permissions::RESTORE_RECYCLE_ITEM
            | Permissions::RESTORE_FILE_VERSION
    }

    /// Manager role: everything the letters can express
    pub fn manager() -> Permissions {
        Permissions::all().difference(Permissions::SET_QUOTA)
    }
}
