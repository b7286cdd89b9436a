use rand::seq::SliceRandom;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

use super::song::{LoopMode, Song};
use crate::error::{PlayerError, PlayerResult};

pub const MAX_HISTORY_SIZE: usize = 30;
pub const SONGS_PER_PAGE: usize = 15;

/// Cola, historial y respaldo de loop de un guild.
///
/// `loop_backup` mirrors every song seen in the current loop cycle (deduplicated
/// by `webpage_url`) and is only consulted to refill an empty queue when
/// `loop_mode == Queue`.
#[derive(Debug, Clone)]
pub struct MusicQueue {
    items: VecDeque<Song>,
    loop_backup: Vec<Song>,
    history: Vec<Song>,
    history_position: usize,
    current: Option<Song>,
    loop_mode: LoopMode,
    shuffle: bool,
    max_history: usize,
}

impl Default for MusicQueue {
    fn default() -> Self {
        Self::new(MAX_HISTORY_SIZE)
    }
}

impl MusicQueue {
    pub fn new(max_history: usize) -> Self {
        Self {
            items: VecDeque::new(),
            loop_backup: Vec::new(),
            history: Vec::new(),
            history_position: 0,
            current: None,
            loop_mode: LoopMode::Off,
            shuffle: false,
            max_history: max_history.max(1),
        }
    }

    /// Agrega un track a la cola
    pub fn enqueue(&mut self, song: Song) {
        info!("➕ Agregado a la cola: {}", song.title);
        self.mirror_into_backup(&song);
        self.items.push_back(song);
    }

    /// Reinserta una canción al frente (reconexión, canción anterior, reinicio de seek).
    pub fn enqueue_front(&mut self, song: Song) {
        self.mirror_into_backup(&song);
        self.items.push_front(song);
    }

    /// Obtiene el siguiente track según el modo de loop.
    pub fn dequeue_next(&mut self) -> Option<Song> {
        if self.loop_mode == LoopMode::Song {
            if let Some(current) = &self.current {
                info!("🔂 Repitiendo track: {}", current.title);
                return Some(current.clone());
            }
        }

        if let Some(next) = self.items.pop_front() {
            debug!("➡️ Siguiente en cola (FIFO): {}", next.title);
            return Some(next);
        }

        if self.loop_mode == LoopMode::Queue && !self.loop_backup.is_empty() {
            info!(
                "🔁 Cola vacía, restaurando desde loop backup ({} canciones)",
                self.loop_backup.len()
            );
            self.items = self.loop_backup.iter().cloned().collect();
            if self.shuffle {
                self.items.make_contiguous().shuffle(&mut rand::thread_rng());
            }
            return self.items.pop_front();
        }

        debug!("📭 Cola vacía, no hay siguiente track");
        None
    }

    /// Cola visible: la cola real seguida de lo que el loop de cola volvería a reproducir.
    pub fn visible_queue(&self) -> Vec<Song> {
        let mut visible: Vec<Song> = self.items.iter().cloned().collect();

        if self.loop_mode == LoopMode::Queue && !self.loop_backup.is_empty() {
            let queued: HashSet<&str> = self.items.iter().map(|s| s.webpage_url.as_str()).collect();
            visible.extend(
                self.loop_backup
                    .iter()
                    .filter(|s| !queued.contains(s.webpage_url.as_str()))
                    .cloned(),
            );
        }

        visible
    }

    /// Elimina un track específico
    pub fn remove(&mut self, position: usize) -> PlayerResult<Song> {
        let len = self.items.len();
        let song = self
            .items
            .remove(position)
            .ok_or(PlayerError::OutOfRange { position, len })?;
        debug!("❌ Track eliminado en posición {}", position);
        Ok(song)
    }

    /// Mueve un track a una nueva posición
    pub fn move_song(&mut self, from: usize, to: usize) -> PlayerResult<()> {
        let len = self.items.len();
        if from >= len {
            return Err(PlayerError::OutOfRange { position: from, len });
        }
        if to >= len {
            return Err(PlayerError::OutOfRange { position: to, len });
        }

        if from != to {
            if let Some(song) = self.items.remove(from) {
                self.items.insert(to, song);
            }
            debug!("📍 Track movido de posición {} a {}", from, to);
        }

        Ok(())
    }

    /// Registra una canción terminada u omitida.
    ///
    /// Duplicates leave both the history and its cursor untouched.
    pub fn add_to_history(&mut self, song: Song) {
        self.mirror_into_backup(&song);

        if self.history.iter().any(|s| s.webpage_url == song.webpage_url) {
            return;
        }

        self.history.push(song);
        self.history_position = self.history.len();

        if self.history.len() > self.max_history {
            let overflow = self.history.len() - self.max_history;
            self.history.drain(..overflow);
            self.history_position = self.history_position.min(self.history.len());
        }
    }

    /// Vacía la cola y el respaldo de loop; el historial se conserva.
    pub fn clear(&mut self) {
        self.items.clear();
        self.loop_backup.clear();
        info!("🗑️ Cola limpiada");
    }

    /// Mezcla la cola y el respaldo de loop
    pub fn shuffle_all(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        self.loop_backup.shuffle(&mut rng);
        info!("🔀 Cola mezclada");
    }

    /// Cambia el modo de shuffle
    pub fn toggle_shuffle(&mut self) -> bool {
        self.shuffle = !self.shuffle;
        if self.shuffle {
            self.shuffle_all();
            info!("🔀 Modo aleatorio activado");
        } else {
            info!("➡️ Modo aleatorio desactivado");
        }
        self.shuffle
    }

    /// Cambia el modo de loop
    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Repetición desactivada"),
            LoopMode::Song => info!("🔂 Repetir canción activado"),
            LoopMode::Queue => info!("🔁 Repetir cola activado"),
        }
    }

    /// Desactiva la repetición de canción tras fallos repetidos del stream.
    pub fn demote_song_loop(&mut self) -> bool {
        if self.loop_mode == LoopMode::Song {
            self.loop_mode = LoopMode::Off;
            return true;
        }
        false
    }

    /// Retrocede el cursor del historial y convierte esa canción en la actual.
    ///
    /// The song being replaced goes back to the head of the queue.
    pub fn step_back(&mut self) -> PlayerResult<Song> {
        if self.history.is_empty() || self.history_position == 0 {
            return Err(PlayerError::NoPreviousSong);
        }

        self.history_position = self.history_position.min(self.history.len()) - 1;
        let previous = self.history[self.history_position].clone();

        if let Some(current) = self.current.take() {
            self.items.push_front(current);
        }
        self.current = Some(previous.clone());

        Ok(previous)
    }

    /// Salta a una posición (base 0) de la cola visible.
    ///
    /// Songs passed over are recorded in history. A target that only exists in
    /// the loop backup is copied to the head of the queue. Leaves `current`
    /// empty so the caller can start the next track.
    pub fn skip_to(&mut self, position: usize, requested_by: &str) -> PlayerResult<Song> {
        let visible = self.visible_queue();
        let target = visible
            .get(position)
            .cloned()
            .ok_or(PlayerError::OutOfRange { position, len: visible.len() })?;

        if let Some(current) = self.current.take() {
            self.add_to_history(current);
        }

        if position < self.items.len() {
            for _ in 0..position {
                if let Some(skipped) = self.items.pop_front() {
                    self.add_to_history(skipped);
                }
            }
        } else {
            let passed: Vec<Song> = self.items.drain(..).collect();
            for skipped in passed {
                self.add_to_history(skipped);
            }
            let mut copy = target.clone();
            copy.requested_by = requested_by.to_string();
            self.items.push_front(copy);
        }

        Ok(target)
    }

    pub fn reset_history_cursor(&mut self) {
        self.history_position = self.history.len();
    }

    /// Restaura el estado persistido aplicando los límites vigentes.
    pub fn restore(
        &mut self,
        queue: Vec<Song>,
        loop_backup: Vec<Song>,
        history: Vec<Song>,
        history_position: Option<usize>,
        loop_mode: LoopMode,
        shuffle: bool,
    ) {
        self.items = queue.into();

        let mut seen = HashSet::new();
        self.loop_backup = loop_backup
            .into_iter()
            .filter(|s| seen.insert(s.webpage_url.clone()))
            .collect();

        let mut seen = HashSet::new();
        let mut history: Vec<Song> = history
            .into_iter()
            .filter(|s| seen.insert(s.webpage_url.clone()))
            .collect();
        if history.len() > self.max_history {
            history.drain(..history.len() - self.max_history);
        }
        self.history = history;
        self.history_position = history_position
            .unwrap_or(self.history.len())
            .min(self.history.len());

        self.loop_mode = loop_mode;
        self.shuffle = shuffle;
    }

    /// Obtiene una página (base 1) de la cola visible
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let visible = self.visible_queue();
        let items_per_page = items_per_page.max(1);
        let total_items = visible.len();
        let total_pages = if total_items == 0 { 1 } else { total_items.div_ceil(items_per_page) };
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;
        let end = (start + items_per_page).min(total_items);

        QueuePage {
            items: visible.get(start..end).map(<[Song]>::to_vec).unwrap_or_default(),
            first_position: start + 1,
            current_page,
            total_pages,
            total_items,
            total_duration: visible.iter().map(|s| s.duration).sum(),
        }
    }

    fn mirror_into_backup(&mut self, song: &Song) {
        if !self.loop_backup.iter().any(|s| s.webpage_url == song.webpage_url) {
            self.loop_backup.push(song.clone());
        }
    }

    pub fn current(&self) -> Option<&Song> {
        self.current.as_ref()
    }

    pub fn set_current(&mut self, song: Option<Song>) {
        self.current = song;
    }

    pub fn take_current(&mut self) -> Option<Song> {
        self.current.take()
    }

    pub fn items(&self) -> &VecDeque<Song> {
        &self.items
    }

    pub fn loop_backup(&self) -> &[Song] {
        &self.loop_backup
    }

    pub fn history(&self) -> &[Song] {
        &self.history
    }

    pub fn history_position(&self) -> usize {
        self.history_position
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn is_shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Song>,
    /// Posición (base 1) del primer elemento de la página.
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub total_duration: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn song(id: &str) -> Song {
        Song {
            url: format!("https://cdn.example/{id}"),
            webpage_url: format!("https://www.youtube.com/watch?v={id}"),
            title: id.to_uppercase(),
            duration: 180,
            uploader: "tester".to_string(),
            thumbnail: String::new(),
            requested_by: "alice".to_string(),
        }
    }

    fn titles(songs: impl IntoIterator<Item = Song>) -> Vec<String> {
        songs.into_iter().map(|s| s.title).collect()
    }

    #[test]
    fn test_enqueue_mirrors_into_loop_backup_without_duplicates() {
        let mut queue = MusicQueue::default();
        queue.enqueue(song("a"));
        queue.enqueue(song("b"));
        queue.enqueue(song("a"));

        assert_eq!(queue.len(), 3);
        assert_eq!(titles(queue.loop_backup().to_vec()), vec!["A", "B"]);
    }

    #[test]
    fn test_dequeue_is_fifo_when_loop_off() {
        let mut queue = MusicQueue::default();
        queue.enqueue(song("a"));
        queue.enqueue(song("b"));

        assert_eq!(queue.dequeue_next().map(|s| s.title), Some("A".to_string()));
        assert_eq!(queue.dequeue_next().map(|s| s.title), Some("B".to_string()));
        assert!(queue.dequeue_next().is_none());
    }

    #[test]
    fn test_song_loop_repeats_current() {
        let mut queue = MusicQueue::default();
        queue.enqueue(song("b"));
        queue.set_current(Some(song("a")));
        queue.set_loop_mode(LoopMode::Song);

        assert_eq!(queue.dequeue_next(), Some(song("a")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_queue_loop_refills_from_backup_in_order() {
        let mut queue = MusicQueue::default();
        for id in ["a", "b", "c"] {
            queue.enqueue(song(id));
        }
        while let Some(next) = queue.dequeue_next() {
            queue.add_to_history(next);
        }
        queue.set_loop_mode(LoopMode::Queue);

        let head = queue.dequeue_next();
        assert_eq!(head, Some(song("a")));
        assert_eq!(titles(queue.items().iter().cloned()), vec!["B", "C"]);
    }

    #[test]
    fn test_queue_loop_refill_with_shuffle_is_a_permutation() {
        let mut queue = MusicQueue::default();
        for id in ["a", "b", "c", "d", "e"] {
            queue.enqueue(song(id));
        }
        queue.items.clear();
        queue.set_loop_mode(LoopMode::Queue);
        queue.shuffle = true;

        let head = queue.dequeue_next().expect("refill");
        let mut all: Vec<String> = titles(queue.items().iter().cloned());
        all.push(head.title);
        all.sort();
        assert_eq!(all, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_history_is_bounded_and_deduplicated() {
        let mut queue = MusicQueue::new(3);
        for id in ["a", "b", "c", "b", "d", "e"] {
            queue.add_to_history(song(id));
        }

        assert_eq!(titles(queue.history().to_vec()), vec!["C", "D", "E"]);
        assert_eq!(queue.history_position(), 3);
    }

    #[test]
    fn test_visible_queue_appends_backup_entries_under_queue_loop() {
        let mut queue = MusicQueue::default();
        for id in ["a", "b", "c"] {
            queue.enqueue(song(id));
        }
        let _ = queue.dequeue_next();
        assert_eq!(titles(queue.visible_queue()), vec!["B", "C"]);

        queue.set_loop_mode(LoopMode::Queue);
        assert_eq!(titles(queue.visible_queue()), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_remove_and_move_are_bounds_checked() {
        let mut queue = MusicQueue::default();
        for id in ["a", "b", "c"] {
            queue.enqueue(song(id));
        }

        assert!(matches!(
            queue.remove(3),
            Err(PlayerError::OutOfRange { position: 3, len: 3 })
        ));
        assert!(matches!(queue.move_song(0, 5), Err(PlayerError::OutOfRange { .. })));

        queue.move_song(2, 0).unwrap();
        assert_eq!(titles(queue.items().iter().cloned()), vec!["C", "A", "B"]);
        assert_eq!(queue.remove(1).unwrap().title, "A");
    }

    #[test]
    fn test_clear_keeps_history() {
        let mut queue = MusicQueue::default();
        queue.enqueue(song("a"));
        queue.add_to_history(song("z"));
        queue.clear();

        assert!(queue.is_empty());
        assert!(queue.loop_backup().is_empty());
        assert_eq!(queue.history().len(), 1);
    }

    #[test]
    fn test_step_back_walks_history_and_requeues_current() {
        let mut queue = MusicQueue::default();
        queue.add_to_history(song("a"));
        queue.add_to_history(song("b"));
        queue.set_current(Some(song("c")));

        assert_eq!(queue.step_back().unwrap(), song("b"));
        assert_eq!(queue.items().front(), Some(&song("c")));
        assert_eq!(queue.step_back().unwrap(), song("a"));
        assert!(matches!(queue.step_back(), Err(PlayerError::NoPreviousSong)));
        assert_eq!(queue.history_position(), 0);
    }

    #[test]
    fn test_skip_to_within_queue_records_passed_songs() {
        let mut queue = MusicQueue::default();
        for id in ["a", "b", "c", "d"] {
            queue.enqueue(song(id));
        }
        let next = queue.dequeue_next();
        queue.set_current(next);

        let target = queue.skip_to(2, "bob").unwrap();
        assert_eq!(target, song("d"));
        assert!(queue.current().is_none());
        assert_eq!(titles(queue.history().to_vec()), vec!["A", "B", "C"]);
        assert_eq!(titles(queue.items().iter().cloned()), vec!["D"]);
    }

    #[test]
    fn test_skip_to_backup_entry_copies_it_to_head() {
        let mut queue = MusicQueue::default();
        for id in ["a", "b"] {
            queue.enqueue(song(id));
        }
        let next = queue.dequeue_next();
        queue.set_current(next);
        queue.set_loop_mode(LoopMode::Queue);

        let target = queue.skip_to(1, "bob").unwrap();
        assert_eq!(target, song("a"));
        let head = queue.items().front().cloned().unwrap();
        assert_eq!(head, song("a"));
        assert_eq!(head.requested_by, "bob");
        assert!(matches!(queue.skip_to(9, "bob"), Err(PlayerError::OutOfRange { .. })));
    }

    #[test]
    fn test_restore_enforces_bounds() {
        let mut queue = MusicQueue::new(2);
        queue.restore(
            vec![song("q")],
            vec![song("q"), song("q")],
            vec![song("a"), song("b"), song("c")],
            Some(10),
            LoopMode::Queue,
            true,
        );

        assert_eq!(queue.loop_backup().len(), 1);
        assert_eq!(titles(queue.history().to_vec()), vec!["B", "C"]);
        assert_eq!(queue.history_position(), 2);
        assert_eq!(queue.loop_mode(), LoopMode::Queue);
    }

    #[test]
    fn test_page_of_visible_queue() {
        let mut queue = MusicQueue::default();
        for i in 0..20 {
            queue.enqueue(song(&format!("s{i}")));
        }

        let page = queue.page(2, SONGS_PER_PAGE);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.first_position, 16);
        assert_eq!(page.total_duration, 20 * 180);

        assert_eq!(queue.page(99, SONGS_PER_PAGE).current_page, 2);
        assert_eq!(MusicQueue::default().page(1, SONGS_PER_PAGE).total_pages, 1);
    }
}
